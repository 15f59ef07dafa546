//! Host discovery
//!
//! Liveness probing that runs ahead of the port scan when a task enables
//! `ping`. Hosts that fail the probe are never port scanned.

pub mod methods;

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub use methods::{CompositeProber, IcmpProber, TcpProber};

/// Answers whether a host is reachable
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// `true` when `ip` answered within `timeout`. Probe failures count as dead.
    async fn is_live(&self, ip: IpAddr, timeout: Duration) -> bool;

    fn name(&self) -> &'static str;
}

pub type SharedProber = Arc<dyn LivenessProber>;

/// ICMP when raw sockets are available, TCP otherwise
pub fn default_prober() -> SharedProber {
    Arc::new(CompositeProber::new())
}
