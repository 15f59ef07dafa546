//! Protocol-specific helpers: probe rate limiting and local addressing

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::time::Instant;

/// Well-known TCP service names, used as a protocol hint for open ports
static TCP_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    let mut tcp_services = HashMap::new();
    tcp_services.insert(21, "ftp");
    tcp_services.insert(22, "ssh");
    tcp_services.insert(23, "telnet");
    tcp_services.insert(25, "smtp");
    tcp_services.insert(53, "dns");
    tcp_services.insert(80, "http");
    tcp_services.insert(110, "pop3");
    tcp_services.insert(143, "imap");
    tcp_services.insert(443, "https");
    tcp_services.insert(445, "smb");
    tcp_services.insert(993, "imaps");
    tcp_services.insert(995, "pop3s");
    tcp_services.insert(1433, "mssql");
    tcp_services.insert(1521, "oracle");
    tcp_services.insert(3306, "mysql");
    tcp_services.insert(3389, "rdp");
    tcp_services.insert(5432, "postgresql");
    tcp_services.insert(5900, "vnc");
    tcp_services.insert(6379, "redis");
    tcp_services.insert(8080, "http");
    tcp_services.insert(8443, "https");
    tcp_services.insert(9200, "elasticsearch");
    tcp_services.insert(11211, "memcached");
    tcp_services.insert(27017, "mongodb");
    tcp_services
});

/// Common service name for a TCP port, if any
pub fn tcp_service_hint(port: u16) -> Option<&'static str> {
    TCP_SERVICES.get(&port).copied()
}

/// Token bucket limiting how many probes are issued per second.
///
/// The bucket refills continuously at `rate` tokens per second and holds at
/// most `burst` tokens, a tenth of the rate. Callers that find the bucket
/// empty reserve a future token and sleep until it is due, so concurrent
/// waiters are served in arrival order.
pub struct RateLimiter {
    rate: u32,
    burst: u32,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(packets_per_second: u32) -> Self {
        let rate = packets_per_second.max(1);
        let burst = (rate / 10).max(1);
        Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Wait until a token is available and consume it
    pub async fn acquire(&self) -> crate::Result<()> {
        let delay = self.reserve()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Take a token only if one is available right now
    pub fn try_acquire(&self) -> bool {
        match self.bucket.lock() {
            Ok(mut bucket) => {
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// Consume a token, possibly borrowing against the future, and return how
    /// long the caller has to wait before using it.
    fn reserve(&self) -> crate::Result<Duration> {
        let mut bucket = self
            .bucket
            .lock()
            .map_err(|_| crate::ScanError::RateLimitError)?;
        self.refill(&mut bucket);
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            return Ok(Duration::ZERO);
        }
        let deficit = -bucket.tokens;
        Ok(Duration::from_secs_f64(deficit / self.rate as f64))
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        let tokens = bucket.tokens + elapsed * self.rate as f64;
        bucket.tokens = tokens.min(self.burst as f64);
    }
}

/// Network utilities
pub struct NetworkUtils;

impl NetworkUtils {
    /// Local IPv4 address the kernel would route outbound probes from
    pub fn get_local_ip() -> crate::Result<Ipv4Addr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| crate::ScanError::NetworkError(e.to_string()))?;
        socket
            .connect("8.8.8.8:80")
            .map_err(|e| crate::ScanError::NetworkError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| crate::ScanError::NetworkError(e.to_string()))?;

        match local_addr.ip() {
            std::net::IpAddr::V4(ipv4) => Ok(ipv4),
            std::net::IpAddr::V6(_) => Err(crate::ScanError::InvalidTarget(
                "IPv6 not supported".to_string(),
            )),
        }
    }

    /// Generate a random source port
    pub fn random_source_port() -> u16 {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        rng.gen_range(32768..65535)
    }

    /// Whether the process may open raw sockets
    pub fn has_raw_socket_privilege() -> bool {
        #[cfg(unix)]
        {
            // SAFETY: geteuid has no preconditions and cannot fail
            unsafe { libc::geteuid() == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}
