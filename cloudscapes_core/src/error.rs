//! Error types for CloudScapes GPU operations
//!
//! Every failure coming out of the graphics API or the GPU allocator is mapped
//! to one of these variants. Failures are fatal to the calling operation:
//! nothing is retried and no partial result is returned.

use std::fmt;

/// Result type for CloudScapes operations
pub type Result<T> = std::result::Result<T, Error>;

/// CloudScapes errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Buffer creation, memory allocation or memory binding failed
    ResourceCreationError(String),

    /// The GPU allocator rejected an allocate/free request
    AllocatorError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Any other graphics API call failed (recording, submission, mapping, waits)
    BackendError(String),

    /// Device bootstrap failed (library loading, instance, device, queues)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceCreationError(msg) => write!(f, "Resource creation error: {}", msg),
            Error::AllocatorError(msg) => write!(f, "Allocator error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
