//! TCP connect scanner

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;

use crate::core::{Scanner, ScannerOption};
use crate::network::protocol::RateLimiter;
use crate::network::{OpenEndpoint, SharedProbeSink};
use crate::ScanError;

/// Full three-way handshake scanner. Every probe runs as its own tracked
/// task; a completed connection is an open port, anything else is no result.
pub struct ConnectScanner {
    limiter: RateLimiter,
    timeout: Duration,
    sink: SharedProbeSink,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl ConnectScanner {
    pub fn new(option: ScannerOption, sink: SharedProbeSink) -> crate::Result<Self> {
        if option.timeout.is_zero() {
            return Err(ScanError::ConfigError("timeout can not set to 0".to_string()));
        }
        let limiter = RateLimiter::new(option.rate);
        log::debug!(
            "connect scanner: rate {}/s burst {} timeout {:?}",
            limiter.rate(),
            limiter.burst(),
            option.timeout
        );
        Ok(Self {
            limiter,
            timeout: option.timeout,
            sink,
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Probes issued but not yet reported
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

async fn connect_probe(addr: SocketAddr, timeout_duration: Duration) -> bool {
    match timeout(timeout_duration, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            log::trace!("{} closed: {}", addr, e);
            false
        }
        Err(_) => {
            log::trace!("{} timed out", addr);
            false
        }
    }
}

#[async_trait]
impl Scanner for ConnectScanner {
    async fn probe(&self, ip: IpAddr, port: u16) -> crate::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScanError::ScannerClosed);
        }

        let sink = Arc::clone(&self.sink);
        let timeout_duration = self.timeout;
        self.tracker.spawn(async move {
            let outcome = connect_probe(SocketAddr::new(ip, port), timeout_duration)
                .await
                .then(|| OpenEndpoint::new(ip, port));
            sink.report(outcome).await;
        });
        Ok(())
    }

    async fn await_rate_limit(&self) -> crate::Result<()> {
        self.limiter.acquire().await
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn release(&self) {
        self.closed.store(true, Ordering::Release);
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn name(&self) -> &'static str {
        "TCP Connect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ProbeSink;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CollectSink {
        reports: Mutex<Vec<Option<OpenEndpoint>>>,
    }

    #[async_trait]
    impl ProbeSink for CollectSink {
        async fn report(&self, outcome: Option<OpenEndpoint>) {
            self.reports.lock().await.push(outcome);
        }
    }

    fn scanner(sink: Arc<CollectSink>) -> ConnectScanner {
        ConnectScanner::new(ScannerOption::new(1000, Duration::from_millis(500)), sink).unwrap()
    }

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        // bind and drop to find a port nobody listens on
        let closed_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let sink = Arc::new(CollectSink::default());
        let scanner = scanner(Arc::clone(&sink));
        let localhost: IpAddr = "127.0.0.1".parse().unwrap();

        for port in [open_port, closed_port] {
            scanner.await_rate_limit().await.unwrap();
            scanner.probe(localhost, port).await.unwrap();
        }
        scanner.drain().await;
        assert_eq!(scanner.in_flight(), 0);

        let reports = sink.reports.lock().await;
        assert_eq!(reports.len(), 2);
        let open: Vec<_> = reports.iter().flatten().collect();
        assert_eq!(open, vec![&OpenEndpoint::new(localhost, open_port)]);
    }

    #[tokio::test]
    async fn test_probe_after_release_fails() {
        let sink = Arc::new(CollectSink::default());
        let scanner = scanner(sink);
        scanner.release().await;
        let err = scanner
            .probe("127.0.0.1".parse().unwrap(), 80)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ScannerClosed));
    }

    #[tokio::test]
    async fn test_drain_can_be_repeated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let sink = Arc::new(CollectSink::default());
        let scanner = scanner(Arc::clone(&sink));
        let localhost: IpAddr = "127.0.0.1".parse().unwrap();

        scanner.probe(localhost, port).await.unwrap();
        scanner.drain().await;
        scanner.probe(localhost, port).await.unwrap();
        scanner.drain().await;

        assert_eq!(sink.reports.lock().await.len(), 2);
    }
}
