//! Tether MCP - Model Context Protocol dispatch for single-threaded hosts
//!
//! This crate routes MCP requests to registered tools, resources and prompts.
//! Host applications whose API may only be touched from one thread mark their
//! handlers main-thread-only; such calls are posted to the host's execution
//! thread through a [`SignalHost`] channel and awaited with a timeout.

// Core modules
pub mod error;
pub mod handoff;
pub mod item;
pub mod protocol;
pub mod registry;
pub mod signal;
pub mod task;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use error::DispatchError;
pub use handoff::{MainThreadCaller, DEFAULT_MAIN_THREAD_TIMEOUT};
pub use item::{Arguments, Category, Handler, HandlerResult, Item, Primitive};
pub use protocol::{DispatcherConfig, McpDispatcher, McpProtocol};
pub use registry::{Registry, RegistryError};
pub use signal::{ExecutionLoop, MainThreadQueue, SignalHost, TaskSignal};
pub use task::{TaskDispatcher, TaskError, TaskId};
pub use template::UriTemplate;
pub use types::{JsonRpcRequest, JsonRpcResponse, McpError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::item::*;
    pub use crate::protocol::*;
    pub use crate::registry::*;
    pub use crate::signal::*;
    pub use crate::task::*;
    pub use crate::types::*;
}
