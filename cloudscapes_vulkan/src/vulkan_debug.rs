//! Validation layer debug messenger
//!
//! Routes VK_LAYER_KHRONOS_validation messages into the CloudScapes logger
//! (or a file), with severity/category filtering, optional statistics and
//! abort/panic on errors.
//!
//! The callback runs inside the driver (`extern "system"`), where unwinding is
//! not allowed. Strict-mode errors are therefore recorded there and raised as a
//! panic on the caller's thread by `raise_strict_validation_failure`.

use ash::vk;
use cloudscapes_core::log::{self, LogSeverity};
use cloudscapes_core::{Config, DebugMessageFilter, DebugOutput, DebugSeverity, ValidationStats};
use colored::*;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

const SOURCE: &str = "cloudscapes::vulkan::validation";

/// Active callback configuration
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

/// Validation message counters
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrence count per distinct message
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Devices with a live debug messenger
static ACTIVE_MESSENGERS: Mutex<usize> = Mutex::new(0);

/// First validation error seen in strict mode, not yet raised
static STRICT_FAILURE: Mutex<Option<String>> = Mutex::new(None);

/// Debug configuration for the callback
#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    pub break_on_error: bool,
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

impl DebugConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            severity: config.debug_severity,
            output: config.debug_output.clone(),
            message_filter: config.debug_message_filter,
            break_on_error: config.break_on_validation_error,
            panic_on_error: config.panic_on_error,
            enable_stats: config.enable_validation_stats,
        }
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        let counter = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Install the callback configuration and reset statistics
pub fn init_debug_config(config: DebugConfig) {
    VALIDATION_STATS.reset();

    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
    if let Ok(mut failure) = STRICT_FAILURE.lock() {
        *failure = None;
    }
    if let Ok(mut current) = DEBUG_CONFIG.lock() {
        *current = Some(config);
    }
}

/// Drop the callback configuration; later messages are ignored
pub fn cleanup_debug_config() {
    if let Ok(mut current) = DEBUG_CONFIG.lock() {
        *current = None;
    }
}

/// Account for a new device messenger
///
/// The first registration resets statistics; later ones only replace the
/// active configuration.
pub(crate) fn register_messenger(config: DebugConfig) {
    let Ok(mut active) = ACTIVE_MESSENGERS.lock() else {
        return;
    };
    if *active == 0 {
        init_debug_config(config);
    } else if let Ok(mut current) = DEBUG_CONFIG.lock() {
        *current = Some(config);
    }
    *active += 1;
}

/// Release a device messenger; the configuration goes away with the last one
pub(crate) fn unregister_messenger() {
    let Ok(mut active) = ACTIVE_MESSENGERS.lock() else {
        return;
    };
    *active = active.saturating_sub(1);
    if *active == 0 {
        cleanup_debug_config();
    }
}

/// Panic on the calling thread if a strict-mode validation error was recorded
pub(crate) fn raise_strict_validation_failure() {
    let failure = match STRICT_FAILURE.lock() {
        Ok(mut failure) => failure.take(),
        Err(_) => None,
    };
    if let Some(message) = failure {
        panic!("{}", message);
    }
}

fn record_strict_failure(message: String) {
    if let Ok(mut failure) = STRICT_FAILURE.lock() {
        failure.get_or_insert(message);
    }
}

/// Current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print a colored validation statistics report to stdout
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "✓ No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Ok(tracker) = MESSAGE_TRACKER.lock() {
        if let Some(messages) = tracker.as_ref() {
            let repeated = messages.values().filter(|&&count| count > 1).count();
            if repeated > 0 {
                println!("\n  {} {} message(s) appeared multiple times", "ℹ".cyan(), repeated);
            }
        }
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

/// Whether a message of `severity` passes the configured severity filter
pub(crate) fn passes_severity(
    filter: DebugSeverity,
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
) -> bool {
    match filter {
        DebugSeverity::ErrorsOnly => severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
        DebugSeverity::ErrorsAndWarnings => {
            severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
                || severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING)
        }
        DebugSeverity::All => true,
    }
}

/// Whether a message of `message_type` passes the category filter
pub(crate) fn passes_category(
    filter: &DebugMessageFilter,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> bool {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        filter.show_validation
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        filter.show_performance
    } else {
        filter.show_general
    }
}

pub(crate) fn log_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Info
    } else {
        LogSeverity::Trace
    }
}

pub(crate) fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

fn track_message(message: &str) -> u32 {
    match MESSAGE_TRACKER.lock() {
        Ok(mut tracker) => {
            let messages = tracker.get_or_insert_with(FxHashMap::default);
            let count = messages.entry(message.to_string()).or_insert(0);
            *count += 1;
            *count
        }
        Err(_) => 1,
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Vulkan debug messenger callback
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let config = match DEBUG_CONFIG.lock() {
        Ok(guard) => match guard.as_ref() {
            Some(config) => config.clone(),
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    if p_callback_data.is_null()
        || !passes_severity(config.severity, message_severity)
        || !passes_category(&config.message_filter, message_type)
    {
        return vk::FALSE;
    }

    let callback_data = &*p_callback_data;
    let message_id_name = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");
    let type_str = message_type_label(message_type);

    let repeat_indicator = if config.enable_stats {
        VALIDATION_STATS.record(message_severity);
        match track_message(&message) {
            1 => String::new(),
            count => format!(" [×{}]", count),
        }
    } else {
        String::new()
    };

    let line = format!("[{}]{} {}: {}", type_str, repeat_indicator, message_id_name, message);

    match &config.output {
        DebugOutput::Console => {
            log::log(log_severity(message_severity), SOURCE, line);
        }
        DebugOutput::File(path) => {
            write_to_file(path, &line);
        }
        DebugOutput::Both(path) => {
            write_to_file(path, &line);
            log::log(log_severity(message_severity), SOURCE, line);
        }
    }

    let is_error = message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);

    if is_error && config.panic_on_error {
        record_strict_failure(format!(
            "Validation error (strict mode) {} [{}]: {}", message_id_name, type_str, message
        ));
    }

    if is_error && config.break_on_error {
        eprintln!(
            "\n{}\n  Context: {} [{}]\n  Message: {}\n",
            "⚠️  BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
            message_id_name.yellow(),
            type_str.cyan(),
            message
        );
        std::process::abort();
    }

    vk::FALSE
}

fn write_to_file(path: &str, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", message);
    }
}

#[cfg(test)]
#[path = "vulkan_debug_tests.rs"]
mod tests;
