//! Liveness probe implementations - ICMP echo and TCP connect

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

use super::LivenessProber;
use crate::network::icmp::IcmpPinger;

/// Ports tried by [`TcpProber`] when none are given
pub const DEFAULT_TCP_PROBE_PORTS: &[u16] = &[80, 443, 22, 445, 3389];

/// ICMP echo request, IPv4 only
pub struct IcmpProber {
    pinger: IcmpPinger,
}

impl IcmpProber {
    /// Fails when the process cannot open raw ICMP sockets
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            pinger: IcmpPinger::new()?,
        })
    }
}

#[async_trait]
impl LivenessProber for IcmpProber {
    async fn is_live(&self, ip: IpAddr, timeout: Duration) -> bool {
        let IpAddr::V4(v4) = ip else {
            return false;
        };
        match self.pinger.ping(v4, timeout).await {
            Ok(alive) => alive,
            Err(e) => {
                log::debug!("icmp probe {} failed: {}", ip, e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "icmp"
    }
}

/// TCP connect to a few common ports. Any answer, including a refused
/// connection, proves the host is up.
#[derive(Debug, Clone)]
pub struct TcpProber {
    ports: Vec<u16>,
}

impl TcpProber {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_PROBE_PORTS.to_vec())
    }
}

async fn tcp_answers(addr: SocketAddr, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => e.kind() == io::ErrorKind::ConnectionRefused,
        Err(_) => false,
    }
}

#[async_trait]
impl LivenessProber for TcpProber {
    async fn is_live(&self, ip: IpAddr, timeout: Duration) -> bool {
        let mut attempts: FuturesUnordered<_> = self
            .ports
            .iter()
            .map(|&port| tcp_answers(SocketAddr::new(ip, port), timeout))
            .collect();

        while let Some(answered) = attempts.next().await {
            if answered {
                return true;
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// ICMP first when raw sockets are available, then TCP
pub struct CompositeProber {
    icmp: Option<IcmpProber>,
    tcp: TcpProber,
}

impl CompositeProber {
    pub fn new() -> Self {
        let icmp = match IcmpProber::new() {
            Ok(prober) => Some(prober),
            Err(e) => {
                log::debug!("icmp liveness unavailable, using tcp only: {}", e);
                None
            }
        };
        Self {
            icmp,
            tcp: TcpProber::default(),
        }
    }

    pub fn uses_icmp(&self) -> bool {
        self.icmp.is_some()
    }
}

impl Default for CompositeProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LivenessProber for CompositeProber {
    async fn is_live(&self, ip: IpAddr, timeout: Duration) -> bool {
        if let Some(icmp) = &self.icmp {
            if icmp.is_live(ip, timeout).await {
                return true;
            }
        }
        self.tcp.is_live(ip, timeout).await
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}
