//! Packet crafting and reply parsing for the SYN scanner

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use rand::Rng;
use std::net::Ipv4Addr;

const IP_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;

/// TCP packet builder for crafting IPv4 + TCP probe packets
pub struct TcpPacketBuilder {
    source_ip: Ipv4Addr,
    dest_ip: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
    flags: u8,
    seq_num: u32,
    ack_num: u32,
    window_size: u16,
    ip_id: u16,
}

impl TcpPacketBuilder {
    pub fn new(source_ip: Ipv4Addr, dest_ip: Ipv4Addr, source_port: u16, dest_port: u16) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            source_ip,
            dest_ip,
            source_port,
            dest_port,
            flags: 0,
            seq_num: rng.gen(),
            ack_num: 0,
            window_size: 1024,
            ip_id: rng.gen(),
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn syn(mut self) -> Self {
        self.flags |= TcpFlags::SYN as u8;
        self
    }

    pub fn rst(mut self) -> Self {
        self.flags |= TcpFlags::RST as u8;
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = seq_num;
        self
    }

    pub fn window_size(mut self, window_size: u16) -> Self {
        self.window_size = window_size;
        self
    }

    /// Build only the TCP header, for raw sockets where the kernel writes
    /// the IP header. The checksum still covers the IPv4 pseudo-header.
    pub fn build_segment(self) -> Vec<u8> {
        let mut segment = vec![0u8; TCP_HEADER_LEN];
        self.write_tcp_header(&mut segment);
        segment
    }

    /// Build the complete IP + TCP packet
    pub fn build(self) -> Vec<u8> {
        let total_len = IP_HEADER_LEN + TCP_HEADER_LEN;
        let mut packet_buf = vec![0u8; total_len];

        if let Some(mut ip_packet) = MutableIpv4Packet::new(&mut packet_buf[..IP_HEADER_LEN]) {
            ip_packet.set_version(4);
            ip_packet.set_header_length(5);
            ip_packet.set_total_length(total_len as u16);
            ip_packet.set_identification(self.ip_id);
            ip_packet.set_flags(2); // Don't fragment
            ip_packet.set_ttl(64);
            ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip_packet.set_source(self.source_ip);
            ip_packet.set_destination(self.dest_ip);

            let checksum = pnet::packet::ipv4::checksum(&ip_packet.to_immutable());
            ip_packet.set_checksum(checksum);
        }

        self.write_tcp_header(&mut packet_buf[IP_HEADER_LEN..]);
        packet_buf
    }

    fn write_tcp_header(&self, buf: &mut [u8]) {
        if let Some(mut tcp_packet) = MutableTcpPacket::new(buf) {
            tcp_packet.set_source(self.source_port);
            tcp_packet.set_destination(self.dest_port);
            tcp_packet.set_sequence(self.seq_num);
            tcp_packet.set_acknowledgement(self.ack_num);
            tcp_packet.set_data_offset(5);
            tcp_packet.set_flags(self.flags as u16);
            tcp_packet.set_window(self.window_size);
            tcp_packet.set_urgent_ptr(0);

            let checksum = pnet::packet::tcp::ipv4_checksum(
                &tcp_packet.to_immutable(),
                &self.source_ip,
                &self.dest_ip,
            );
            tcp_packet.set_checksum(checksum);
        }
    }
}

/// Packet parser for analyzing received packets
pub struct PacketParser;

impl PacketParser {
    /// Parse an IPv4 datagram carrying TCP
    pub fn parse_tcp_response(packet: &[u8]) -> Option<TcpResponse> {
        if packet.len() < IP_HEADER_LEN {
            return None;
        }

        let ip_packet = Ipv4Packet::new(packet)?;
        if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
            return None;
        }

        let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
        if packet.len() < ip_header_len + TCP_HEADER_LEN {
            return None;
        }
        let tcp_packet = TcpPacket::new(&packet[ip_header_len..])?;

        Some(TcpResponse {
            source_ip: ip_packet.get_source(),
            dest_ip: ip_packet.get_destination(),
            source_port: tcp_packet.get_source(),
            dest_port: tcp_packet.get_destination(),
            flags: tcp_packet.get_flags() as u8,
            seq_num: tcp_packet.get_sequence(),
            ack_num: tcp_packet.get_acknowledgement(),
        })
    }
}

/// TCP response structure
#[derive(Debug, Clone)]
pub struct TcpResponse {
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    pub flags: u8,
    pub seq_num: u32,
    pub ack_num: u32,
}

impl TcpResponse {
    pub fn is_syn_ack(&self) -> bool {
        (self.flags & (TcpFlags::SYN as u8 | TcpFlags::ACK as u8))
            == (TcpFlags::SYN as u8 | TcpFlags::ACK as u8)
    }

    pub fn is_rst(&self) -> bool {
        (self.flags & TcpFlags::RST as u8) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syn_packet_layout() {
        let src: Ipv4Addr = "192.168.1.10".parse().unwrap();
        let dst: Ipv4Addr = "192.168.1.20".parse().unwrap();
        let packet = TcpPacketBuilder::new(src, dst, 40000, 443).syn().build();
        assert_eq!(packet.len(), 40);

        let parsed = PacketParser::parse_tcp_response(&packet).unwrap();
        assert_eq!(parsed.source_ip, src);
        assert_eq!(parsed.dest_ip, dst);
        assert_eq!(parsed.source_port, 40000);
        assert_eq!(parsed.dest_port, 443);
        assert_eq!(parsed.flags, TcpFlags::SYN as u8);
        assert!(!parsed.is_syn_ack());
    }

    #[test]
    fn test_reply_flags() {
        let a: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let b: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let syn_ack = TcpPacketBuilder::new(a, b, 80, 40000)
            .flags(TcpFlags::SYN as u8 | TcpFlags::ACK as u8)
            .build();
        let parsed = PacketParser::parse_tcp_response(&syn_ack).unwrap();
        assert!(parsed.is_syn_ack());
        assert!(!parsed.is_rst());

        let rst = TcpPacketBuilder::new(a, b, 80, 40000).rst().build();
        assert!(PacketParser::parse_tcp_response(&rst).unwrap().is_rst());
    }

    #[test]
    fn test_segment_only() {
        let src: Ipv4Addr = "10.1.1.1".parse().unwrap();
        let dst: Ipv4Addr = "10.1.1.2".parse().unwrap();
        let segment = TcpPacketBuilder::new(src, dst, 41000, 22).syn().build_segment();
        assert_eq!(segment.len(), TCP_HEADER_LEN);
        let tcp = TcpPacket::new(&segment).unwrap();
        assert_eq!(tcp.get_destination(), 22);
        assert_eq!(tcp.get_flags() as u8, TcpFlags::SYN as u8);
    }

    #[test]
    fn test_rejects_short_buffers() {
        assert!(PacketParser::parse_tcp_response(&[0u8; 10]).is_none());
    }
}
