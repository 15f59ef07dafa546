//! TCP SYN (half-open) scanner
//!
//! Probes are single SYN segments sent over a raw socket. A blocking receive
//! loop reads every TCP segment addressed to the scanner's source port and
//! correlates it back to the outstanding probe by `(address, port)`: SYN-ACK
//! reports the port open, RST reports no result, and probes that see no reply
//! before their deadline are reported as no result too. The kernel answers the
//! SYN-ACK with its own RST, so nothing else is sent.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::core::{Scanner, ScannerOption};
use crate::network::packet::{PacketParser, TcpPacketBuilder};
use crate::network::protocol::{NetworkUtils, RateLimiter};
use crate::network::socket::RawSocket;
use crate::network::{OpenEndpoint, SharedProbeSink};
use crate::ScanError;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const RECV_BUFFER: usize = 4096;

type ProbeKey = (Ipv4Addr, u16);

/// Probe outcome bookkeeping: counts issued probes until their report lands
struct Reports {
    sink: SharedProbeSink,
    /// Probes issued but not yet reported
    in_flight: AtomicUsize,
    idle: Notify,
    /// Reports handed off by the receive loop
    tasks: TaskTracker,
}

impl Reports {
    fn new(sink: SharedProbeSink) -> Self {
        Self {
            sink,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            tasks: TaskTracker::new(),
        }
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn complete(&self, outcome: Option<OpenEndpoint>) {
        self.sink.report(outcome).await;
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Report from a blocking thread without waiting on the sink, so a slow
    /// downstream stage never stalls socket reads.
    fn hand_off(self: &Arc<Self>, handle: &Handle, outcome: Option<OpenEndpoint>) {
        let reports = Arc::clone(self);
        self.tasks
            .spawn_on(async move { reports.complete(outcome).await }, handle);
    }

    /// Wait until every issued probe has been reported
    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// State shared between the scanner and its receive loop
struct Shared {
    socket: RawSocket,
    local_ip: Ipv4Addr,
    source_port: u16,
    reports: Arc<Reports>,
    /// Outstanding probes and their reply deadline
    pending: Mutex<HashMap<ProbeKey, Instant>>,
    closed: AtomicBool,
}

impl Shared {
    fn take_pending(&self, key: &ProbeKey) -> bool {
        match self.pending.lock() {
            Ok(mut pending) => pending.remove(key).is_some(),
            Err(_) => false,
        }
    }

    fn take_expired(&self, now: Instant) -> Vec<ProbeKey> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        let expired: Vec<ProbeKey> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            pending.remove(key);
        }
        expired
    }

    fn take_all(&self) -> Vec<ProbeKey> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(key, _)| key).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Raw-socket half-open scanner, IPv4 only
pub struct SynScanner {
    limiter: RateLimiter,
    timeout: Duration,
    shared: Arc<Shared>,
    receiver: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SynScanner {
    /// Open the raw socket and start the receive loop. Requires a tokio
    /// runtime and raw socket privilege.
    pub fn new(option: ScannerOption, sink: SharedProbeSink) -> crate::Result<Self> {
        option.validate()?;
        if !NetworkUtils::has_raw_socket_privilege() {
            return Err(ScanError::PermissionError(
                "SYN scan requires root privileges".to_string(),
            ));
        }

        let handle = Handle::try_current()
            .map_err(|e| ScanError::ConfigError(format!("no async runtime: {}", e)))?;

        let socket = RawSocket::new_tcp()?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let local_ip = NetworkUtils::get_local_ip()?;
        let source_port = NetworkUtils::random_source_port();

        let shared = Arc::new(Shared {
            socket,
            local_ip,
            source_port,
            reports: Arc::new(Reports::new(sink)),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let loop_shared = Arc::clone(&shared);
        let loop_handle = handle.clone();
        let receiver = handle.spawn_blocking(move || receive_loop(loop_shared, loop_handle));

        log::debug!(
            "syn scanner: {}:{} rate {}/s timeout {:?}",
            local_ip,
            source_port,
            option.rate,
            option.timeout
        );

        Ok(Self {
            limiter: RateLimiter::new(option.rate),
            timeout: option.timeout,
            shared,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
        })
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.shared.local_ip
    }

    pub fn source_port(&self) -> u16 {
        self.shared.source_port
    }

    fn register(&self, key: ProbeKey) -> bool {
        match self.shared.pending.lock() {
            Ok(mut pending) => {
                if pending.contains_key(&key) {
                    return false;
                }
                pending.insert(key, Instant::now() + self.timeout);
                true
            }
            Err(_) => false,
        }
    }
}

fn receive_loop(shared: Arc<Shared>, handle: Handle) {
    let mut buf = [0u8; RECV_BUFFER];

    while !shared.closed.load(Ordering::Acquire) {
        match shared.socket.recv_from(&mut buf) {
            Ok(Some((size, _))) => {
                if let Some(reply) = PacketParser::parse_tcp_response(&buf[..size]) {
                    if reply.dest_port == shared.source_port
                        && (reply.is_syn_ack() || reply.is_rst())
                    {
                        let key = (reply.source_ip, reply.source_port);
                        if shared.take_pending(&key) {
                            let outcome = reply
                                .is_syn_ack()
                                .then(|| OpenEndpoint::new(IpAddr::V4(key.0), key.1));
                            shared.reports.hand_off(&handle, outcome);
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => log::debug!("syn receive error: {}", e),
        }

        for _ in shared.take_expired(Instant::now()) {
            shared.reports.hand_off(&handle, None);
        }
    }

    // released with probes still outstanding
    for _ in shared.take_all() {
        shared.reports.hand_off(&handle, None);
    }
}

#[async_trait]
impl Scanner for SynScanner {
    async fn probe(&self, ip: IpAddr, port: u16) -> crate::Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ScanError::ScannerClosed);
        }

        self.shared.reports.begin();

        let dst = match ip {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                log::trace!("syn scan skips IPv6 target {}", ip);
                self.shared.reports.complete(None).await;
                return Ok(());
            }
        };

        let key = (dst, port);
        if !self.register(key) {
            self.shared.reports.complete(None).await;
            return Ok(());
        }

        let segment = TcpPacketBuilder::new(self.shared.local_ip, dst, self.shared.source_port, port)
            .syn()
            .seq_num(rand::random())
            .build_segment();

        if let Err(e) = self.shared.socket.send_to(&segment, SocketAddr::new(ip, 0)) {
            log::trace!("syn send to {}:{} failed: {}", dst, port, e);
            if self.shared.take_pending(&key) {
                self.shared.reports.complete(None).await;
            }
        }
        Ok(())
    }

    async fn await_rate_limit(&self) -> crate::Result<()> {
        self.limiter.acquire().await
    }

    async fn drain(&self) {
        self.shared.reports.wait_idle().await;
    }

    async fn release(&self) {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(receiver) = self.receiver.lock().await.take() {
            if let Err(e) = receiver.await {
                log::warn!("syn receive loop failed: {}", e);
            }
        }
        self.shared.reports.flush().await;
    }

    fn name(&self) -> &'static str {
        "TCP SYN"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ProbeSink;

    struct NullSink;

    #[async_trait]
    impl ProbeSink for NullSink {
        async fn report(&self, _outcome: Option<OpenEndpoint>) {}
    }

    /// Holds every report until the gate opens
    struct GatedSink {
        gate: tokio::sync::Semaphore,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl ProbeSink for GatedSink {
        async fn report(&self, _outcome: Option<OpenEndpoint>) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hand_off_never_waits_on_sink() {
        let sink = Arc::new(GatedSink {
            gate: tokio::sync::Semaphore::new(0),
            seen: AtomicUsize::new(0),
        });
        let reports = Arc::new(Reports::new(sink.clone()));
        for _ in 0..100 {
            reports.begin();
        }

        // same shape as the receive loop: a blocking thread reporting outcomes
        let handle = Handle::current();
        let blocking = Arc::clone(&reports);
        let loop_done = tokio::task::spawn_blocking(move || {
            for port in 0..100u16 {
                let outcome = (port % 2 == 0)
                    .then(|| OpenEndpoint::new("192.0.2.1".parse().unwrap(), port));
                blocking.hand_off(&handle, outcome);
            }
        });
        tokio::time::timeout(Duration::from_secs(1), loop_done)
            .await
            .expect("receive side blocked on a saturated sink")
            .unwrap();

        assert_eq!(sink.seen.load(Ordering::SeqCst), 0);
        assert_eq!(reports.in_flight(), 100);

        sink.gate.add_permits(100);
        tokio::time::timeout(Duration::from_secs(5), reports.wait_idle())
            .await
            .unwrap();
        reports.flush().await;
        assert_eq!(sink.seen.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_requires_valid_option() {
        let result = SynScanner::new(
            ScannerOption::new(5, Duration::from_millis(800)),
            Arc::new(NullSink),
        );
        assert!(matches!(result, Err(ScanError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_privilege_check() {
        let result = SynScanner::new(ScannerOption::default(), Arc::new(NullSink));
        if NetworkUtils::has_raw_socket_privilege() {
            // the sandbox may still refuse raw sockets or have no route
            if let Ok(scanner) = result {
                assert_eq!(scanner.name(), "TCP SYN");
                scanner.release().await;
            }
        } else {
            assert!(matches!(result, Err(ScanError::PermissionError(_))));
        }
    }

    #[tokio::test]
    async fn test_unanswered_probe_times_out() {
        if !NetworkUtils::has_raw_socket_privilege() {
            return;
        }
        let Ok(scanner) = SynScanner::new(
            ScannerOption::new(100, Duration::from_millis(200)),
            Arc::new(NullSink),
        ) else {
            return;
        };
        // TEST-NET-1, never routed
        scanner.probe("192.0.2.1".parse().unwrap(), 80).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), scanner.drain())
            .await
            .unwrap();
        scanner.release().await;
    }
}
