//! Configuration module for the radar engine
//!
//! Every numeric knob is clamped on assignment rather than rejected; only the
//! exclusion window is validated strictly.

use crate::network::ScanMode;
use crate::schedule::ExclusionWindow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const MIN_RATE: u32 = 1;
pub const MAX_RATE: u32 = 1000;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 10_000;
pub const MAX_POOL_PING: usize = 1000;
pub const MAX_POOL_SCAN: usize = 500;
pub const MAX_POOL_FINGER: usize = 500;

/// Concurrency limit of each pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSize {
    pub ping: usize,
    pub scan: usize,
    pub finger: usize,
}

impl Default for PoolSize {
    fn default() -> Self {
        Self {
            ping: 10,
            scan: 10,
            finger: 50,
        }
    }
}

/// Scan configuration, copied into a task when it is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOption {
    /// Free-form site label passed through to reports
    pub location: String,

    /// Human readable task name
    pub name: String,

    /// Comma separated CIDR blocks, ranges or addresses
    pub target: String,

    /// Addresses to skip, same syntax as `target`
    pub exclude_target: String,

    /// Port ranges and presets, e.g. `top1000,8000-9000`
    pub port: String,

    pub mode: ScanMode,

    /// Probes per second
    pub rate: u32,

    /// Per-probe timeout in milliseconds
    pub timeout: u64,

    pub pool: PoolSize,

    /// Run the liveness probe before scanning a host
    pub ping: bool,

    /// Ask the fingerprinter for HTTP details
    pub httpx: bool,

    pub screenshot: bool,

    pub report: bool,

    pub exclude_time_range: Option<ExclusionWindow>,

    pub debug: bool,
}

impl Default for TaskOption {
    fn default() -> Self {
        Self {
            location: String::new(),
            name: String::new(),
            target: String::new(),
            exclude_target: String::new(),
            port: "top1000".to_string(),
            mode: ScanMode::Connect,
            rate: 500,
            timeout: 800,
            pool: PoolSize::default(),
            ping: false,
            httpx: false,
            screenshot: false,
            report: false,
            exclude_time_range: None,
            debug: false,
        }
    }
}

impl TaskOption {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn set_rate(&mut self, rate: u32) {
        self.rate = rate.clamp(MIN_RATE, MAX_RATE);
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout = timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
    }

    pub fn set_pool_ping(&mut self, n: usize) {
        self.pool.ping = n.clamp(1, MAX_POOL_PING);
    }

    pub fn set_pool_scan(&mut self, n: usize) {
        self.pool.scan = n.clamp(1, MAX_POOL_SCAN);
    }

    pub fn set_pool_finger(&mut self, n: usize) {
        self.pool.finger = n.clamp(1, MAX_POOL_FINGER);
    }

    /// Accepts `mode,begin,end`; an empty string clears the window.
    pub fn set_exclude_time_range(&mut self, spec: &str) -> crate::Result<()> {
        if spec.trim().is_empty() {
            self.exclude_time_range = None;
            return Ok(());
        }
        self.exclude_time_range = Some(ExclusionWindow::parse(spec)?);
        Ok(())
    }

    pub fn set_exclude_target(&mut self, spec: &str) {
        self.exclude_target = spec.trim().to_string();
    }

    pub fn with_ports(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rate(mut self, rate: u32) -> Self {
        self.set_rate(rate);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.set_timeout(timeout_ms);
        self
    }

    pub fn with_pool(mut self, ping: usize, scan: usize, finger: usize) -> Self {
        self.set_pool_ping(ping);
        self.set_pool_scan(scan);
        self.set_pool_finger(finger);
        self
    }

    pub fn with_ping(mut self, ping: bool) -> Self {
        self.ping = ping;
        self
    }

    pub fn with_exclude_target(mut self, spec: &str) -> Self {
        self.set_exclude_target(spec);
        self
    }

    pub fn with_exclude_time_range(mut self, spec: &str) -> crate::Result<Self> {
        self.set_exclude_time_range(spec)?;
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Re-apply every clamp, used after deserializing
    pub fn normalize(&mut self) {
        self.set_rate(self.rate);
        self.set_timeout(self.timeout);
        self.set_pool_ping(self.pool.ping);
        self.set_pool_scan(self.pool.scan);
        self.set_pool_finger(self.pool.finger);
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.target.trim().is_empty() {
            return Err(crate::ScanError::ConfigError(
                "target cannot be empty".to_string(),
            ));
        }

        if self.rate < MIN_RATE {
            return Err(crate::ScanError::ConfigError(
                "rate must be greater than 0".to_string(),
            ));
        }

        if self.pool.ping == 0 || self.pool.scan == 0 || self.pool.finger == 0 {
            return Err(crate::ScanError::ConfigError(
                "pool sizes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let mut option: TaskOption = toml::from_str(content)?;
        option.normalize();
        Ok(option)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Engine-level settings shared by every task a radar runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub name: String,

    pub debug: bool,

    /// Seconds between exclusion window checks
    pub monitor_interval_secs: u64,

    /// Liveness probe timeout in milliseconds
    pub liveness_timeout_ms: u64,

    /// Template for new tasks
    pub defaults: TaskOption,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            name: "radar".to_string(),
            debug: false,
            monitor_interval_secs: 5,
            liveness_timeout_ms: 800,
            defaults: TaskOption::default(),
        }
    }
}

impl RadarConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: RadarConfig = toml::from_str(&content)?;
        config.defaults.normalize();
        Ok(config)
    }

    /// Load `~/.radar.toml`, falling back to defaults
    pub fn load_default_config() -> Self {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".radar.toml");
            if config_path.exists() {
                match Self::from_toml_file(&config_path) {
                    Ok(config) => return config,
                    Err(e) => log::warn!(
                        "ignoring {}: {}",
                        config_path.display(),
                        e
                    ),
                }
            }
        }
        Self::default()
    }

    /// A fresh task option seeded from `defaults`
    pub fn new_task_option(&self, target: impl Into<String>) -> TaskOption {
        TaskOption {
            target: target.into(),
            ..self.defaults.clone()
        }
    }
}
