//! Error handling for the radar engine
//!
//! Configuration and construction failures are fatal for a task; transport
//! failures during scanning never surface as `ScanError` at all, they are
//! counted as completed units without a result.

use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Port range error: {0}")]
    PortRangeError(String),

    #[error("Timeout error")]
    TimeoutError,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Rate limit exceeded")]
    RateLimitError,

    #[error("Raw socket error: {0}")]
    RawSocketError(String),

    #[error("Schedule error: {0}")]
    ScheduleError(String),

    #[error("Task state error: {0}")]
    TaskStateError(String),

    #[error("scanner is closed")]
    ScannerClosed,
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Errors that end a task in the `Error` state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::PermissionError(_)
                | ScanError::InvalidTarget(_)
                | ScanError::PortRangeError(_)
                | ScanError::ConfigError(_)
                | ScanError::ParseError(_)
                | ScanError::RawSocketError(_)
                | ScanError::ScheduleError(_)
        )
    }
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::ParseError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ScanError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ScanError::TimeoutError
    }
}

impl From<chrono::ParseError> for ScanError {
    fn from(e: chrono::ParseError) -> Self {
        ScanError::ScheduleError(e.to_string())
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::ParseError(e.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for ScanError {
    fn from(e: ipnetwork::IpNetworkError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::PortRangeError("ports len is 0".to_string());
        assert_eq!(err.to_string(), "Port range error: ports len is 0");
        assert_eq!(ScanError::ScannerClosed.to_string(), "scanner is closed");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ScanError::InvalidTarget("x".into()).is_fatal());
        assert!(ScanError::PermissionError("raw".into()).is_fatal());
        assert!(!ScanError::TimeoutError.is_fatal());
        assert!(!ScanError::ScannerClosed.is_fatal());
    }

    #[test]
    fn test_conversions() {
        let addr: Result<std::net::IpAddr, _> = "not-an-ip".parse();
        let err: ScanError = addr.unwrap_err().into();
        assert!(matches!(err, ScanError::InvalidTarget(_)));

        let num: Result<u16, _> = "99999".parse::<u16>();
        let err: ScanError = num.unwrap_err().into();
        assert!(matches!(err, ScanError::ParseError(_)));
    }
}
