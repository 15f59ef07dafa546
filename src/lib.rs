//! Radar - network reconnaissance scan engine
//!
//! Discovers live hosts in a target range, scans a derived port set and hands
//! every open endpoint to a fingerprinting [`Dispatch`], under rate,
//! concurrency and schedule limits.

pub mod config;
pub mod core;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod radar;
pub mod scanner;
pub mod schedule;
pub mod task;
pub mod top_ports;
pub mod utils;

// Re-export commonly used types
pub use config::{PoolSize, RadarConfig, TaskOption};
pub use crate::core::{Scanner, ScannerBuilder, ScannerFactory, ScannerOption};
pub use discovery::{LivenessProber, SharedProber};
pub use dispatch::{Dispatch, EndpointTransfer, LogDispatch, Service};
pub use error::{ScanError, ScanResult};
pub use network::{OpenEndpoint, ProbeSink, ScanMode};
pub use radar::{Radar, RadarInfo};
pub use schedule::{Clock, ExclusionWindow, FixedClock, SystemClock, WindowMode};
pub use task::{ResumeOutcome, Task, TaskInfo, TaskStatus};
pub use top_ports::{expand_ports, get_top_1000_ports, PortPreset};

pub type Result<T> = std::result::Result<T, ScanError>;
