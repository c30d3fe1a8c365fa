//! Shared plumbing for the gworkspace-mcp crates: tracing setup, resolved
//! filesystem paths and external tool probing.

pub mod capabilities;
pub mod paths;
pub mod tracing;

pub use capabilities::{Capabilities, ExternalTool, ToolAvailability};
pub use paths::AppPaths;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
