//! ICMP echo for host liveness checks

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use crate::network::socket::RawSocket;
use crate::ScanError;

const ECHO_LEN: usize = 16;

/// Sends ICMP echo requests over a raw socket and waits for the matching reply
pub struct IcmpPinger {
    identifier: u16,
    sequence: AtomicU16,
}

impl IcmpPinger {
    /// Fails with `PermissionError` when raw sockets are not available.
    pub fn new() -> crate::Result<Self> {
        // open once up front so missing privilege surfaces at construction
        RawSocket::new_icmp()?;
        Ok(Self {
            identifier: rand::thread_rng().gen(),
            sequence: AtomicU16::new(0),
        })
    }

    /// `true` when an echo reply from `target` arrives within `timeout`
    pub async fn ping(&self, target: Ipv4Addr, timeout: Duration) -> crate::Result<bool> {
        let identifier = self.identifier;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        tokio::task::spawn_blocking(move || echo(target, identifier, sequence, timeout))
            .await
            .map_err(|e| ScanError::NetworkError(e.to_string()))?
    }
}

fn echo(target: Ipv4Addr, identifier: u16, sequence: u16, timeout: Duration) -> crate::Result<bool> {
    let socket = RawSocket::new_icmp()?;
    let request = build_echo_request(identifier, sequence);
    socket.send_to(&request, SocketAddr::new(IpAddr::V4(target), 0))?;

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        socket.set_read_timeout(Some(remaining))?;
        let Some((size, _)) = socket.recv_from(&mut buf)? else {
            continue;
        };
        if is_matching_reply(&buf[..size], target, identifier, sequence) {
            return Ok(true);
        }
    }
}

fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buf = vec![0u8; ECHO_LEN];
    if let Some(mut echo) = MutableEchoRequestPacket::new(&mut buf) {
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(IcmpCode(0));
        echo.set_identifier(identifier);
        echo.set_sequence_number(sequence);
    }
    if let Some(icmp) = IcmpPacket::new(&buf) {
        let checksum = pnet::packet::icmp::checksum(&icmp);
        buf[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    buf
}

fn is_matching_reply(datagram: &[u8], target: Ipv4Addr, identifier: u16, sequence: u16) -> bool {
    let Some(ip) = Ipv4Packet::new(datagram) else {
        return false;
    };
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp || ip.get_source() != target {
        return false;
    }
    match EchoReplyPacket::new(ip.payload()) {
        Some(reply) => {
            reply.get_icmp_type() == IcmpTypes::EchoReply
                && reply.get_identifier() == identifier
                && reply.get_sequence_number() == sequence
        }
        None => false,
    }
}
