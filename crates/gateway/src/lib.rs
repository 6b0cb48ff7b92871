//! Protocol-facing endpoint.
//!
//! ```text
//! MCP client ──HTTP POST /__mcp──▶ McpService ──▶ CapabilityRegistry (validate)
//!                                       │
//!                                       ▼
//!                                     Relay ──HubTransport (/__mcp/ws)──▶ page
//! ```

pub mod rpc;
pub mod server;
pub mod session;

pub use rpc::McpService;
pub use server::{endpoint_router, negotiate, Gateway, GatewayState, ResponseMode};
pub use session::{SessionStore, SESSION_HEADER};
