//! Stdio tool-serving loop for Google Workspace.
//!
//! Speaks newline-delimited JSON-RPC 2.0 (the MCP stdio transport). Tools
//! obtain their bearer token through the gate in `gworkspace-auth` on every
//! call.

pub mod error;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::{ServerError, ServerResult};
pub use protocol::{PROTOCOL_VERSION, Request, Response, SERVER_NAME};
pub use server::{McpServer, handle_line, handle_request};
pub use tools::{CallToolRequest, CallToolResult, Tool, Toolbox};
