//! Server side of the call protocol: turns `(name, params)` into a settled
//! [`ToolResult`](pagebridge_core::ToolResult) by way of the page.

pub mod id;
pub mod pending;
pub mod relay;

pub use id::next_call_id;
pub use pending::PendingTable;
pub use relay::{Relay, RelayOptions};
