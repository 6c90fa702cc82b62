//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry and DefaultLogger formatting.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "cloudscapes::vulkan::buffer".to_string(),
        message: "staging buffer released".to_string(),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_are_fixed_width() {
    let severities = [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ];
    for severity in severities {
        assert_eq!(severity.label().len(), 5);
    }
    assert_eq!(LogSeverity::Info.label().trim_end(), "INFO");
}

#[test]
fn test_log_severity_copy() {
    let sev1 = LogSeverity::Warn;
    let sev2 = sev1;
    assert_eq!(sev1, sev2);
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_clone() {
    let entry1 = entry(LogSeverity::Error, Some("vulkan_buffer.rs"), Some(42));
    let entry2 = entry1.clone();

    assert_eq!(entry1.severity, entry2.severity);
    assert_eq!(entry1.source, entry2.source);
    assert_eq!(entry1.message, entry2.message);
    assert_eq!(entry1.file, entry2.file);
    assert_eq!(entry1.line, entry2.line);
}

#[test]
fn test_log_entry_debug() {
    let debug_str = format!("{:?}", entry(LogSeverity::Debug, None, None));
    assert!(debug_str.contains("Debug"));
    assert!(debug_str.contains("staging buffer released"));
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Info, None, None));
    assert!(line.contains("[INFO ]"));
    assert!(line.contains("[cloudscapes::vulkan::buffer]"));
    assert!(line.ends_with("staging buffer released"));
}

#[test]
fn test_format_plain_with_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("vulkan_buffer.rs"), Some(7)));
    assert!(line.contains("[ERROR]"));
    assert!(line.ends_with("(vulkan_buffer.rs:7)"));
}

#[test]
fn test_format_plain_requires_both_file_and_line() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("vulkan_buffer.rs"), None));
    assert!(!line.contains("vulkan_buffer.rs"));
}

#[test]
fn test_format_plain_timestamp_shape() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Warn, None, None));
    // [YYYY-MM-DD HH:MM:SS.mmm]
    let timestamp = &line[1..24];
    assert_eq!(timestamp.len(), 23);
    assert_eq!(&timestamp[4..5], "-");
    assert_eq!(&timestamp[10..11], " ");
    assert_eq!(&timestamp[19..20], ".");
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    logger.log(&entry(LogSeverity::Trace, None, None));
    logger.log(&entry(LogSeverity::Debug, None, None));
    logger.log(&entry(LogSeverity::Info, None, None));
    logger.log(&entry(LogSeverity::Warn, None, None));
    logger.log(&entry(LogSeverity::Error, Some("log_tests.rs"), Some(1)));
}
