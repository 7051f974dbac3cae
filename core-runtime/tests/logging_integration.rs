//! Integration tests for logging system
//!
//! The global subscriber can only be installed once per process, so every
//! check that needs it lives in a single test.

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::Error;
use tracing::{debug, info, info_span};

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_spans(false);

    init_logging(config.clone()).expect("first initialization succeeds");

    let span = info_span!("sync_series", series_id = "test");
    let _entered = span.enter();
    info!(remote_series_id = 42, "Series synchronized");
    debug!(pairs = 3, "Change-finder cycle finished");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_config_builder() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Trace)
        .with_filter("core_sync=trace")
        .with_spans(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Trace);
    assert_eq!(config.filter.as_deref(), Some("core_sync=trace"));
    assert!(config.enable_spans);
}
