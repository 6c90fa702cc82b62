/*!
# CloudScapes Core

API-independent building blocks shared by the CloudScapes GPU crates.

## Contents

- **Error / Result**: closed error enumeration used by every GPU operation
- **log**: pluggable logger, default colored console output and the
  `cloud_*!` logging macros
- **Config**: device creation settings (validation layers, debug output)
- **Vertex**: default interleaved vertex layout for mesh uploads

The Vulkan buffer transfer helpers live in `cloudscapes_vulkan`.
*/

mod error;
mod config;
mod vertex;
pub mod log;

pub use error::{Error, Result};
pub use config::{Config, DebugSeverity, DebugOutput, DebugMessageFilter, ValidationStats};
pub use vertex::Vertex;

// Re-export math library at crate root
pub use glam;
