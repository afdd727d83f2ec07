//! MCP (Model Context Protocol) handlers

use crate::{
    error::{ServerError, ServerResult},
    server::ServerState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tether_mcp::{JsonRpcRequest, JsonRpcResponse};
use tracing::warn;

/// JSON-RPC endpoint. Notifications are acknowledged with 202 and no body.
pub async fn rpc(State(state): State<ServerState>, body: Bytes) -> ServerResult<Response> {
    let request: JsonRpcRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejecting malformed MCP request");
        ServerError::InvalidRequest(format!("Invalid JSON: {e}"))
    })?;

    match state.protocol.handle_request(request).await {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

/// Debug listing of tools, shaped like a `tools/list` response
pub async fn list_tools(State(state): State<ServerState>) -> ServerResult<Json<JsonRpcResponse>> {
    let request = JsonRpcRequest::new(1, "tools/list", None);
    state
        .protocol
        .handle_request(request)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::Internal("tools/list produced no response".to_string()))
}

/// Endpoint overview
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "MCP Server",
        "endpoints": [
            "POST / (MCP protocol)",
            "GET /health",
            "GET /tools"
        ]
    }))
}
