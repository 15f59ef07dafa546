//! Raw socket management and operations

use crate::ScanError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::Duration;

/// Raw socket wrapper for sending crafted packets and reading replies
pub struct RawSocket {
    socket: Socket,
}

impl RawSocket {
    /// Create a new raw TCP socket
    pub fn new_tcp() -> crate::Result<Self> {
        Self::open(Protocol::TCP)
    }

    /// Create a new raw ICMP socket
    pub fn new_icmp() -> crate::Result<Self> {
        Self::open(Protocol::ICMPV4)
    }

    fn open(protocol: Protocol) -> crate::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::from(libc::SOCK_RAW), Some(protocol))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    ScanError::PermissionError("Permission denied for raw socket".to_string())
                } else {
                    ScanError::RawSocketError(e.to_string())
                }
            })?;
        Ok(Self { socket })
    }

    /// Send a raw packet to the specified destination
    pub fn send_to(&self, packet: &[u8], dest: SocketAddr) -> crate::Result<usize> {
        let bytes_sent = self
            .socket
            .send_to(packet, &dest.into())
            .map_err(|e| ScanError::NetworkError(e.to_string()))?;
        Ok(bytes_sent)
    }

    /// Receive one datagram. `Ok(None)` means the read timed out or would block.
    pub fn recv_from(&self, buf: &mut [u8]) -> crate::Result<Option<(usize, SocketAddr)>> {
        let mut uninit_buf: Vec<MaybeUninit<u8>> = vec![MaybeUninit::uninit(); buf.len()];

        match self.socket.recv_from(&mut uninit_buf) {
            Ok((size, addr)) => {
                let socket_addr = addr.as_socket().ok_or_else(|| {
                    ScanError::NetworkError("Invalid socket address received".to_string())
                })?;
                let size = size.min(buf.len());

                for i in 0..size {
                    // SAFETY: recv_from initialized the first `size` bytes
                    buf[i] = unsafe { uninit_buf[i].assume_init() };
                }

                Ok(Some((size, socket_addr)))
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(ScanError::NetworkError(format!(
                "Socket receive error: {}",
                e
            ))),
        }
    }

    /// Set receive timeout
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> crate::Result<()> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(|e| ScanError::NetworkError(e.to_string()))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> crate::Result<()> {
        self.socket
            .set_nonblocking(nonblocking)
            .map_err(|e| ScanError::NetworkError(e.to_string()))
    }
}
