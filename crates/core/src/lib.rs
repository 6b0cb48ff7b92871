pub mod config;
pub mod error;
pub mod message;
pub mod paths;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{CallEnvelope, ContentBlock, ResultEnvelope, ToolResult};
pub use paths::Paths;

/// Event names carried over the live-reload side channel.
pub mod events {
    /// Server → page: `{id, name, params}`.
    pub const TOOL_CALL: &str = "mcp:tool-call";
    /// Page → server: `{id, result}`.
    pub const TOOL_RESULT: &str = "mcp:tool-result";
    /// Page → server, no payload: the dispatcher is live.
    pub const BRIDGE_READY: &str = "mcp:bridge-ready";
}
