//! Network module for packet crafting and protocol handling

pub mod icmp;
pub mod packet;
pub mod protocol;
pub mod socket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Port scanning strategies a task can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// TCP SYN scan (half-open, raw socket)
    Syn,
    /// TCP connect scan (full connection)
    #[serde(alias = "tcp", alias = "pn")]
    Connect,
}

impl ScanMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScanMode::Syn => "SYN",
            ScanMode::Connect => "Connect",
        }
    }

    /// Check if the mode requires raw sockets
    pub fn requires_raw_socket(&self) -> bool {
        matches!(self, ScanMode::Syn)
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Connect
    }
}

impl FromStr for ScanMode {
    type Err = std::convert::Infallible;

    /// Anything other than `syn` selects the connect scanner.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("syn") {
            Ok(ScanMode::Syn)
        } else {
            Ok(ScanMode::Connect)
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Syn => write!(f, "syn"),
            ScanMode::Connect => write!(f, "connect"),
        }
    }
}

/// An address/port pair that answered a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl OpenEndpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for OpenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Receives one report per finished probe: `Some` for an open port, `None`
/// when the probe produced no result. Reporting may wait, which is how a
/// saturated downstream stage slows the scanner down.
#[async_trait]
pub trait ProbeSink: Send + Sync {
    async fn report(&self, outcome: Option<OpenEndpoint>);
}

pub type SharedProbeSink = Arc<dyn ProbeSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_parsing() {
        assert_eq!("syn".parse::<ScanMode>().unwrap(), ScanMode::Syn);
        assert_eq!("SYN".parse::<ScanMode>().unwrap(), ScanMode::Syn);
        assert_eq!("tcp".parse::<ScanMode>().unwrap(), ScanMode::Connect);
        assert_eq!("pn".parse::<ScanMode>().unwrap(), ScanMode::Connect);
        assert!(ScanMode::Syn.requires_raw_socket());
        assert!(!ScanMode::Connect.requires_raw_socket());
    }

    #[test]
    fn test_scan_mode_serde_aliases() {
        let mode: ScanMode = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(mode, ScanMode::Connect);
        assert_eq!(serde_json::to_string(&ScanMode::Syn).unwrap(), "\"syn\"");
    }

    #[test]
    fn test_endpoint_display() {
        let v4 = OpenEndpoint::new("10.0.0.1".parse().unwrap(), 443);
        assert_eq!(v4.to_string(), "10.0.0.1:443");
        let v6 = OpenEndpoint::new("::1".parse().unwrap(), 22);
        assert_eq!(v6.to_string(), "[::1]:22");
    }
}
