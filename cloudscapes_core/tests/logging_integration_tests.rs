//! Integration tests for the logging system
//!
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use cloudscapes_core::log::{self, Logger, LogEntry, LogSeverity};
use cloudscapes_core::{cloud_debug, cloud_err, cloud_error, cloud_info, cloud_trace, cloud_warn, Error};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    log::log(LogSeverity::Info, "test::module", "Test info message".to_string());
    log::log(LogSeverity::Warn, "test::module", "Test warning message".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[0].message, "Test info message");
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert!(captured[1].file.is_none());
    }

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_macros_route_to_logger() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    cloud_trace!("cloudscapes::test", "trace {}", 1);
    cloud_debug!("cloudscapes::test", "debug {}", 2);
    cloud_info!("cloudscapes::test", "info {}", 3);
    cloud_warn!("cloudscapes::test", "warn {}", 4);
    cloud_error!("cloudscapes::test", "error {}", 5);

    {
        let captured = entries.lock().unwrap();
        let severities: Vec<LogSeverity> = captured.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![
                LogSeverity::Trace,
                LogSeverity::Debug,
                LogSeverity::Info,
                LogSeverity::Warn,
                LogSeverity::Error,
            ]
        );
        assert_eq!(captured[4].message, "error 5");
        assert!(captured[4].file.unwrap().ends_with("logging_integration_tests.rs"));
        assert!(captured[4].line.is_some());
        assert!(captured[0..4].iter().all(|e| e.line.is_none()));
    }

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_cloud_err_logs_and_builds_error() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    let err = cloud_err!(ResourceCreationError, "cloudscapes::vulkan::buffer", "Failed to create buffer: {}", "oom");

    match &err {
        Error::ResourceCreationError(msg) => assert_eq!(msg, "Failed to create buffer: oom"),
        other => panic!("unexpected variant {:?}", other),
    }

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].severity, LogSeverity::Error);
        assert_eq!(captured[0].source, "cloudscapes::vulkan::buffer");
        assert_eq!(captured[0].message, "Failed to create buffer: oom");
        assert!(captured[0].file.is_some());
    }

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_reset_logger_detaches_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);
    log::reset_logger();

    cloud_info!("cloudscapes::test", "goes to the default logger");

    assert!(entries.lock().unwrap().is_empty());
}
