//! Configuration and construction error handling

use radar::core::{ScannerFactory, ScannerOption};
use radar::network::{OpenEndpoint, ProbeSink};
use radar::{ExclusionWindow, RadarConfig, ScanError, ScanMode, TaskOption, WindowMode};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct NullSink;

#[async_trait::async_trait]
impl ProbeSink for NullSink {
    async fn report(&self, _outcome: Option<OpenEndpoint>) {}
}

#[test]
fn test_setters_clamp() {
    let mut option = TaskOption::new("10.0.0.1");
    option.set_rate(0);
    assert_eq!(option.rate, 1);
    option.set_rate(50_000);
    assert_eq!(option.rate, 1000);
    option.set_timeout(1);
    assert_eq!(option.timeout, 100);
    option.set_timeout(60_000);
    assert_eq!(option.timeout, 10_000);
}

#[test]
fn test_pool_setters_are_independent() {
    let mut option = TaskOption::new("10.0.0.1");
    let rate = option.rate;
    option.set_pool_ping(5000);
    option.set_pool_scan(5000);
    option.set_pool_finger(0);
    assert_eq!(option.pool.ping, 1000);
    assert_eq!(option.pool.scan, 500);
    assert_eq!(option.pool.finger, 1);
    assert_eq!(option.rate, rate);
}

#[test]
fn test_exclusion_window_rejections() {
    let mut option = TaskOption::new("10.0.0.1");
    let err = option.set_exclude_time_range("weekly,09:00,18:00").unwrap_err();
    assert!(matches!(err, ScanError::ScheduleError(_)));
    assert_err!(option.set_exclude_time_range("daily,9am,18:00"));
    assert_err!(option.set_exclude_time_range("daily,09:00"));
    assert!(option.exclude_time_range.is_none());

    assert_ok!(option.set_exclude_time_range("everyWorKDay,08:30,17:30"));
    let window = option.exclude_time_range.unwrap();
    assert_eq!(window.mode, WindowMode::EveryWorkday);

    assert_ok!(option.set_exclude_time_range(""));
    assert!(option.exclude_time_range.is_none());
}

#[test]
fn test_window_display_round_trip() {
    let window = assert_ok!(ExclusionWindow::parse("business-hours-broad,00:00,23:59"));
    let again = assert_ok!(ExclusionWindow::parse(&window.to_string()));
    assert_eq!(window, again);
}

#[test]
fn test_empty_target_is_invalid() {
    assert_err!(TaskOption::new("  ").validate());
    assert_ok!(TaskOption::new("10.0.0.1").validate());
}

#[test]
fn test_toml_values_are_clamped() {
    let option = assert_ok!(TaskOption::from_toml_str(
        r#"
        target = "10.0.0.0/24"
        port = "top200"
        mode = "syn"
        rate = 100000
        timeout = 5

        [pool]
        ping = 2000
        scan = 20
        finger = 30

        [exclude_time_range]
        daily = "daily"
        begin = "22:00"
        end = "06:00"
        "#
    ));
    assert_eq!(option.mode, ScanMode::Syn);
    assert_eq!(option.rate, 1000);
    assert_eq!(option.timeout, 100);
    assert_eq!(option.pool.ping, 1000);
    assert_eq!(option.pool.scan, 20);
    assert!(option.exclude_time_range.is_some());
}

#[test]
fn test_bad_toml_window_is_rejected() {
    assert_err!(TaskOption::from_toml_str(
        r#"
        target = "10.0.0.1"
        [exclude_time_range]
        daily = "sometimes"
        begin = "22:00"
        end = "06:00"
        "#
    ));
}

#[test]
fn test_radar_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        name = "edge-radar"
        monitor_interval_secs = 2

        [defaults]
        port = "top5000"
        rate = 200
        "#
    )
    .unwrap();

    let config = assert_ok!(RadarConfig::from_toml_file(file.path()));
    assert_eq!(config.name, "edge-radar");
    assert_eq!(config.monitor_interval(), Duration::from_secs(2));
    let option = config.new_task_option("10.0.0.1");
    assert_eq!(option.port, "top5000");
    assert_eq!(option.rate, 200);
    assert_eq!(option.target, "10.0.0.1");

    assert_err!(RadarConfig::from_toml_file("/nonexistent/radar.toml"));
}

#[tokio::test]
async fn test_syn_scanner_construction_fails_fast() {
    let low_rate = ScannerFactory::create(
        ScanMode::Syn,
        ScannerOption::new(1, Duration::from_millis(500)),
        Arc::new(NullSink),
    );
    assert!(matches!(low_rate, Err(ScanError::ConfigError(_))));

    let zero_timeout = ScannerFactory::create(
        ScanMode::Syn,
        ScannerOption::new(100, Duration::ZERO),
        Arc::new(NullSink),
    );
    assert!(matches!(zero_timeout, Err(ScanError::ConfigError(_))));
}

#[test]
fn test_fatal_errors() {
    assert!(ScanError::ConfigError("x".into()).is_fatal());
    assert!(ScanError::PermissionError("x".into()).is_fatal());
    assert!(!ScanError::TimeoutError.is_fatal());
}
