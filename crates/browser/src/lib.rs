//! Page side of the bridge.
//!
//! ```text
//! Transport ──mcp:tool-call──▶ Dispatcher ──▶ Handler ──▶ PageEnv subsystems
//!     ▲                                                        (MemoryPage, ...)
//!     └──────────────mcp:tool-result──────────────┘
//! ```

pub mod console;
pub mod dispatcher;
pub mod env;
pub mod handlers;
pub mod memory;

pub use console::ConsoleSink;
pub use dispatcher::Dispatcher;
pub use env::{DetachedEnv, PageEnv};
pub use handlers::Handler;
pub use memory::{MemoryPage, MemoryPageBuilder, Subsystem};
