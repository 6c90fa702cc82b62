//! Device creation settings and validation-layer debug options

/// Which validation messages reach the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Errors only
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose
    All,
}

/// Where validation messages are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    /// Through the process-wide logger
    Console,
    /// Appended to a file
    File(String),
    /// Both
    Both(String),
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Validation message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Total number of messages counted
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Device configuration
///
/// # Example
///
/// ```
/// use cloudscapes_core::{Config, DebugSeverity};
///
/// let config = Config {
///     enable_validation: true,
///     debug_severity: DebugSeverity::All,
///     ..Config::default()
/// };
/// assert!(config.enable_validation);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable VK_LAYER_KHRONOS_validation and the debug messenger
    ///
    /// Ignored unless `cloudscapes_vulkan` is built with its
    /// `vulkan-validation` feature.
    pub enable_validation: bool,
    /// Validation message severity filter
    pub debug_severity: DebugSeverity,
    /// Validation message destination
    pub debug_output: DebugOutput,
    /// Validation message category filter
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,
    /// Panic on the first validation error
    ///
    /// The error is recorded by the messenger callback and the panic is raised
    /// on the calling thread once the Vulkan call that produced it returns
    /// (after each one-shot submission and buffer creation).
    pub panic_on_error: bool,
    /// Count validation messages (see ValidationStats)
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "CloudScapes".to_string(),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
