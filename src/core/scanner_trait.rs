// Radar scanner trait system
// Core trait definitions shared by every port scanning strategy

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::network::{ScanMode, SharedProbeSink};
use crate::scanner::{ConnectScanner, SynScanner};
use crate::ScanError;

/// Lowest probe rate a scanner accepts
pub const MIN_SCANNER_RATE: u32 = 10;

/// Rate and timeout a scanner is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerOption {
    /// Probes per second
    pub rate: u32,
    /// Per-probe timeout
    pub timeout: Duration,
}

impl ScannerOption {
    pub fn new(rate: u32, timeout: Duration) -> Self {
        Self { rate, timeout }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.rate < MIN_SCANNER_RATE {
            return Err(ScanError::ConfigError(format!(
                "rate can not set < {}",
                MIN_SCANNER_RATE
            )));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::ConfigError(
                "timeout can not set to 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScannerOption {
    fn default() -> Self {
        Self {
            rate: 500,
            timeout: Duration::from_millis(800),
        }
    }
}

/// Port scanning strategy.
///
/// `probe` only issues the probe; its outcome is delivered later through the
/// [`ProbeSink`](crate::network::ProbeSink) the scanner was built with,
/// exactly once per probe.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Issue one probe for `ip:port`
    async fn probe(&self, ip: IpAddr, port: u16) -> crate::Result<()>;

    /// Wait for rate limiter admission; call before every probe
    async fn await_rate_limit(&self) -> crate::Result<()>;

    /// Wait until every issued probe has reported
    async fn drain(&self);

    /// Stop accepting probes and free sockets and background tasks
    async fn release(&self);

    /// Get scanner name
    fn name(&self) -> &'static str;
}

/// Builds the scanner a task probes with
pub type ScannerBuilder = Arc<
    dyn Fn(ScanMode, ScannerOption, SharedProbeSink) -> crate::Result<Arc<dyn Scanner>>
        + Send
        + Sync,
>;

pub struct ScannerFactory;

impl ScannerFactory {
    /// [`ScannerFactory::create`] as a [`ScannerBuilder`]
    pub fn builder() -> ScannerBuilder {
        Arc::new(Self::create)
    }

    /// Build the scanner for `mode`. SYN fails fast on an invalid option or
    /// missing raw socket privilege.
    pub fn create(
        mode: ScanMode,
        option: ScannerOption,
        sink: SharedProbeSink,
    ) -> crate::Result<Arc<dyn Scanner>> {
        match mode {
            ScanMode::Syn => Ok(Arc::new(SynScanner::new(option, sink)?)),
            ScanMode::Connect => Ok(Arc::new(ConnectScanner::new(option, sink)?)),
        }
    }
}
