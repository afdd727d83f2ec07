//! HTTP request handlers

pub mod health;
pub mod mcp;

// Re-export handler modules for convenience
pub use health::*;
pub use mcp::*;
