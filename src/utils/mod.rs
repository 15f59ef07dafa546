//! Utility modules for target enumeration

pub mod address_exclusions;
pub mod shuffle;
pub mod target_parser;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize `env_logger`. `RUST_LOG` wins when set, otherwise `level`
    /// applies to this crate and `warn` to everything else.
    pub fn init(level: log::LevelFilter) {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(log::LevelFilter::Warn)
            .filter_module("radar", level)
            .format_timestamp_secs();
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        // a second init (tests, embedding hosts) keeps the first logger
        let _ = builder.try_init();
    }
}
