//! Dispatch error taxonomy and its JSON-RPC mapping

use std::time::Duration;

use crate::item::Category;
use crate::types::{error_codes, McpError};

/// Failure of a single MCP method call
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Unknown method or unregistered primitive
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// Handler failure or dispatch plumbing failure
    #[error("{0}")]
    Internal(String),

    /// The execution thread did not run the handler in time
    #[error("{} execution timed out after {} ms", .operation.title(), .timeout.as_millis())]
    Timeout {
        operation: Category,
        timeout: Duration,
    },
}

impl DispatchError {
    pub fn method_not_found(method: &str) -> Self {
        Self::NotFound(format!("Method not found: {method}"))
    }

    pub fn item_not_found(category: Category, name: &str) -> Self {
        Self::NotFound(format!("{} not found: {name}", category.title()))
    }

    /// Wrap an error raised by a handler
    pub fn handler_failed(category: Category, err: anyhow::Error) -> Self {
        Self::Internal(format!("{} execution error: {err:#}", category.title()))
    }

    pub fn handler_panicked(category: Category, message: &str) -> Self {
        Self::Internal(format!("{} handler panicked: {message}", category.title()))
    }

    /// JSON-RPC error code for this failure
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::Internal(_) | Self::Timeout { .. } => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<DispatchError> for McpError {
    fn from(err: DispatchError) -> Self {
        McpError::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DispatchError::method_not_found("x").code(), -32601);
        assert_eq!(DispatchError::item_not_found(Category::Tool, "x").code(), -32601);
        assert_eq!(DispatchError::InvalidParams("bad".into()).code(), -32602);
        assert_eq!(DispatchError::InvalidRequest("bad".into()).code(), -32600);
        assert_eq!(DispatchError::Internal("boom".into()).code(), -32603);
    }

    #[test]
    fn test_timeout_message() {
        let err = DispatchError::Timeout {
            operation: Category::Tool,
            timeout: Duration::from_millis(200),
        };
        let mcp: McpError = err.into();
        assert_eq!(mcp.code, error_codes::INTERNAL_ERROR);
        assert_eq!(mcp.message, "Tool execution timed out after 200 ms");
    }

    #[test]
    fn test_handler_failure_message() {
        let err = DispatchError::handler_failed(Category::Resource, anyhow::anyhow!("disk gone"));
        assert_eq!(err.to_string(), "Resource execution error: disk gone");
    }
}
