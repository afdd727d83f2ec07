//! Health check handlers

use crate::{error::ServerResult, server::ServerState};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tether_mcp::Category;

/// Basic health check
pub async fn health_check() -> ServerResult<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "server": "MCP"
    })))
}

/// Readiness check - ready once the execution thread channel is registered
pub async fn readiness_check(State(state): State<ServerState>) -> ServerResult<Json<Value>> {
    let running = state.tasks.is_running();

    Ok(Json(json!({
        "status": if running { "ready" } else { "not_ready" },
        "service": "tether-server",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "task_dispatcher": {
                "status": if running { "ok" } else { "error" },
                "channel": state.tasks.channel(),
                "pending_tasks": state.tasks.pending_count(),
            },
            "registry": {
                "tools": state.registry.count(Category::Tool),
                "resources": state.registry.count(Category::Resource),
                "prompts": state.registry.count(Category::Prompt),
            }
        }
    })))
}
