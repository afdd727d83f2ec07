//! Tether Server - HTTP transport for the Tether MCP dispatcher
//!
//! This crate serves MCP over plain HTTP POST. Requests are handled on the
//! tokio runtime while main-thread-only handlers are handed to the host's
//! execution thread.

/// Version of the tether-server crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builtins;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{create_router, ServerState, TetherServer};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{config::*, error::*, handlers::*, server::*};
}
