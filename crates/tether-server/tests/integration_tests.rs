//! Integration tests for tether-server
//!
//! These drive the router end to end: HTTP in, JSON-RPC dispatch, and the
//! hand-off to an execution thread for main-thread-only handlers.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tether_mcp::{ExecutionLoop, MainThreadQueue, SignalHost};
use tether_server::{config::ServerConfig, server::TetherServer};
use tower::ServiceExt;

fn create_test_server() -> (TetherServer, Arc<MainThreadQueue>, ExecutionLoop) {
    let (queue, execution) = MainThreadQueue::new();
    let queue = Arc::new(queue);
    let server = TetherServer::new(
        ServerConfig::default(),
        Arc::clone(&queue) as Arc<dyn SignalHost>,
    )
    .unwrap();
    (server, queue, execution)
}

async fn send_request(router: axum::Router, method: Method, uri: &str, body: Option<&str>) -> Response {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(text) => request
            .header("content-type", "application/json")
            .body(Body::from(text.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    router.oneshot(request).await.unwrap()
}

async fn post_rpc(router: axum::Router, request: Value) -> (StatusCode, Value) {
    let body = serde_json::to_string(&request).unwrap();
    let response = send_request(router, Method::POST, "/", Some(&body)).await;
    let status = response.status();
    (status, read_json(response).await)
}

async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(server.router(), Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"status": "healthy", "server": "MCP"})
    );
}

#[tokio::test]
async fn test_readiness_follows_task_dispatcher() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(server.router(), Method::GET, "/health/ready", None).await;
    assert_eq!(read_json(response).await["status"], "not_ready");

    server.tasks().start().unwrap();
    let response = send_request(server.router(), Method::GET, "/health/ready", None).await;
    let json = read_json(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["checks"]["registry"]["tools"], 3);
}

#[tokio::test]
async fn test_index_lists_endpoints() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(server.router(), Method::GET, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["message"], "MCP Server");
    assert_eq!(json["endpoints"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_tools_debug_listing() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(server.router(), Method::GET, "/tools", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = read_json(response).await;
    assert_eq!(json["jsonrpc"], "2.0");
    assert_eq!(json["id"], 1);
    let names: Vec<&str> = json["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, ["hello_world", "add_numbers", "get_system_info"]);
}

#[tokio::test]
async fn test_initialize_over_http() {
    let (server, _queue, _execution) = create_test_server();

    let (status, json) = post_rpc(
        server.router(),
        json!({"jsonrpc": "2.0", "id": "init", "method": "initialize"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "init");
    assert_eq!(json["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(json["result"]["serverInfo"]["name"], "Tether MCP Server");
}

#[tokio::test]
async fn test_any_thread_tool_without_execution_thread() {
    let (server, _queue, _execution) = create_test_server();

    let (status, json) = post_rpc(
        server.router(),
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "add_numbers", "arguments": {"a": 2, "b": 3}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"jsonrpc": "2.0", "id": 7, "result": 5}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_main_thread_tool_runs_on_execution_thread() {
    let (server, queue, execution) = create_test_server();
    let runner = thread::spawn(move || execution.run());
    server.tasks().start().unwrap();

    let (status, json) = post_rpc(
        server.router(),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "hello_world", "arguments": {"name": "Ada"}}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "Hello, Ada!");

    let (_, json) = post_rpc(
        server.router(),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "resources/read",
            "params": {"uri": "server://greeting/Grace"}
        }),
    )
    .await;
    let contents = &json["result"]["contents"][0];
    assert_eq!(contents["uri"], "server://greeting/Grace");
    assert_eq!(contents["mimeType"], "text/plain");
    assert_eq!(contents["text"], "Hello, Grace!");

    server.tasks().stop();
    queue.close();
    assert_eq!(runner.join().unwrap(), 2);
}

#[tokio::test]
async fn test_main_thread_tool_auto_starts_dispatcher() {
    let (server, queue, execution) = create_test_server();
    assert!(!server.tasks().is_running());
    let runner = thread::spawn(move || execution.run());

    let (_, json) = post_rpc(
        server.router(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "hello_world"}}),
    )
    .await;
    assert_eq!(json["result"], "Hello, World!");
    assert!(server.tasks().is_running());

    server.tasks().stop();
    queue.close();
    runner.join().unwrap();
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(server.router(), Method::POST, "/", Some("{not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = read_json(response).await;
    assert_eq!(json["error"]["type"], "invalid_request");
    assert_eq!(json["error"]["code"], 400);
}

#[tokio::test]
async fn test_notification_is_accepted_without_body() {
    let (server, _queue, _execution) = create_test_server();

    let response = send_request(
        server.router(),
        Method::POST,
        "/",
        Some(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_protocol_errors_travel_in_the_body() {
    let (server, _queue, _execution) = create_test_server();

    let (status, json) = post_rpc(
        server.router(),
        json!({"jsonrpc": "2.0", "id": 9, "method": "sampling/createMessage"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 9);
    assert_eq!(json["error"]["code"], -32601);
    assert_eq!(json["error"]["message"], "Method not found: sampling/createMessage");

    let (_, json) = post_rpc(
        server.router(),
        json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "tools/call",
            "params": {"name": "add_numbers", "arguments": {"a": 1, "b": "x"}}
        }),
    )
    .await;
    assert_eq!(json["error"]["code"], -32603);
    assert_eq!(
        json["error"]["message"],
        "Tool execution error: 'b' must be an integer"
    );
}

#[tokio::test]
async fn test_resource_listings() {
    let (server, _queue, _execution) = create_test_server();

    let (_, json) = post_rpc(
        server.router(),
        json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
    )
    .await;
    let uris: Vec<&str> = json["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|resource| resource["uri"].as_str())
        .collect();
    assert_eq!(uris, ["server://status", "server://config"]);

    let (_, json) = post_rpc(
        server.router(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "resources/templates/list"}),
    )
    .await;
    let templates = json["result"]["resourceTemplates"].as_array().unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["uriTemplate"], "server://greeting/{name}");
}

#[tokio::test]
async fn test_status_resource_is_json_text() {
    let (server, _queue, _execution) = create_test_server();

    let (_, json) = post_rpc(
        server.router(),
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "resources/read",
            "params": {"uri": "server://status"}
        }),
    )
    .await;
    let contents = &json["result"]["contents"][0];
    assert_eq!(contents["mimeType"], "application/json");
    let status: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(status["status"], "running");
}
