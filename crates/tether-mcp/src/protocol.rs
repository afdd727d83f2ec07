//! MCP protocol handling: method routing over the registry

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::handoff::{MainThreadCaller, DEFAULT_MAIN_THREAD_TIMEOUT};
use crate::item::{Arguments, Category, Item};
use crate::registry::Registry;
use crate::task::{panic_message, TaskDispatcher};
use crate::template::query_arguments;
use crate::types::*;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Core MCP protocol trait
#[async_trait]
pub trait McpProtocol: Send + Sync {
    /// Result of the `initialize` handshake
    fn initialize(&self) -> InitializeResult;

    /// Handle one decoded request. Notifications produce `None`.
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse>;

    /// Release execution-thread resources
    async fn shutdown(&self);
}

/// Static settings of a dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub main_thread_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: "Tether MCP Server".to_string(),
                version: crate::VERSION.to_string(),
            },
            main_thread_timeout: DEFAULT_MAIN_THREAD_TIMEOUT,
        }
    }
}

/// Routes MCP methods to registered items
pub struct McpDispatcher {
    config: DispatcherConfig,
    registry: Arc<Registry>,
    caller: MainThreadCaller,
}

impl McpDispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<Registry>,
        tasks: Arc<TaskDispatcher>,
    ) -> Self {
        let caller = MainThreadCaller::new(tasks, config.main_thread_timeout);
        Self {
            config,
            registry,
            caller,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn tasks(&self) -> &Arc<TaskDispatcher> {
        self.caller.tasks()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Execute one method call
    pub async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        match method {
            "initialize" => {
                if let Some(client) = params.as_ref().and_then(|p| p.get("clientInfo")) {
                    info!(client = %client, "Client initializing");
                }
                to_result(&self.initialize())
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(parse_params(params)?).await,
            "resources/list" => Ok(self.list_resources()),
            "resources/templates/list" => Ok(self.list_resource_templates()),
            "resources/read" => self.read_resource(parse_params(params)?).await,
            "prompts/list" => Ok(self.list_prompts()),
            "prompts/get" => self.get_prompt(parse_params(params)?).await,
            other => Err(DispatchError::method_not_found(other)),
        }
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<ToolListEntry> = self
            .registry
            .list(Category::Tool)
            .iter()
            .filter_map(|item| item.as_tool().map(ToolListEntry::from))
            .collect();
        json!({ "tools": tools })
    }

    fn list_resources(&self) -> Value {
        let items = self.registry.list(Category::Resource);
        let resources: Vec<&Resource> = items
            .iter()
            .filter_map(|item| item.as_resource())
            .filter(|resource| resource.uri().is_some())
            .collect();
        json!({ "resources": resources })
    }

    fn list_resource_templates(&self) -> Value {
        let items = self.registry.list(Category::Resource);
        let templates: Vec<&Resource> = items
            .iter()
            .filter_map(|item| item.as_resource())
            .filter(|resource| resource.uri_template().is_some())
            .collect();
        json!({ "resourceTemplates": templates })
    }

    fn list_prompts(&self) -> Value {
        let items = self.registry.list(Category::Prompt);
        let prompts: Vec<&Prompt> = items.iter().filter_map(|item| item.as_prompt()).collect();
        json!({ "prompts": prompts })
    }

    async fn call_tool(&self, params: ToolCallParams) -> Result<Value, DispatchError> {
        let item = self
            .registry
            .get(Category::Tool, &params.name)
            .map_err(|_| DispatchError::item_not_found(Category::Tool, &params.name))?;

        debug!(tool = %params.name, "Calling tool");
        self.invoke(item, params.arguments.unwrap_or_default()).await
    }

    async fn read_resource(&self, params: ResourceReadParams) -> Result<Value, DispatchError> {
        let ResourceReadParams { uri, mut extra } = params;
        let (item, captured) = self
            .registry
            .resolve_resource(&uri)
            .ok_or_else(|| DispatchError::item_not_found(Category::Resource, &uri))?;

        extra.extend(captured);
        extra.extend(query_arguments(&uri));

        debug!(uri = %uri, resource = item.name(), "Reading resource");
        let mime_type = item
            .as_resource()
            .and_then(|resource| resource.mime_type.clone())
            .unwrap_or_else(|| "application/json".to_string());
        let text = match self.invoke(item, extra).await? {
            Value::String(text) => text,
            other => other.to_string(),
        };

        to_result(&ResourceReadResult {
            contents: vec![ResourceContent {
                uri,
                mime_type,
                text,
            }],
        })
    }

    async fn get_prompt(&self, params: PromptGetParams) -> Result<Value, DispatchError> {
        let item = self
            .registry
            .get(Category::Prompt, &params.name)
            .map_err(|_| DispatchError::item_not_found(Category::Prompt, &params.name))?;

        let description = item.as_prompt().and_then(|prompt| prompt.description.clone());
        let value = self.invoke(item, params.arguments.unwrap_or_default()).await?;
        Ok(prompt_result(value, description))
    }

    /// Run an item's handler on the thread its affinity requires
    async fn invoke(&self, item: Arc<Item>, arguments: Arguments) -> Result<Value, DispatchError> {
        let category = item.category();
        if item.main_thread_only() {
            return self.caller.call(category, item.handler(), arguments).await;
        }

        let handler = item.handler();
        match tokio::task::spawn_blocking(move || handler.call(arguments)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DispatchError::handler_failed(category, err)),
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                Err(DispatchError::handler_panicked(
                    category,
                    &panic_message(payload.as_ref()),
                ))
            }
            Err(join_err) => Err(DispatchError::Internal(format!(
                "{} handler was cancelled: {join_err}",
                category.title()
            ))),
        }
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => info!("Client finished initialization"),
            "notifications/cancelled" => debug!("Client cancelled a request"),
            other => debug!(method = other, "Ignoring notification"),
        }
    }
}

#[async_trait]
impl McpProtocol for McpDispatcher {
    fn initialize(&self) -> InitializeResult {
        let list_changed = Some(ListChangedCapability { list_changed: false });
        InitializeResult {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
                resources: list_changed.clone(),
                prompts: if self.registry.count(Category::Prompt) > 0 {
                    list_changed
                } else {
                    None
                },
            },
            server_info: self.config.server_info.clone(),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        let Some(id) = id else {
            self.handle_notification(&method);
            return None;
        };

        if jsonrpc != JSONRPC_VERSION {
            warn!(jsonrpc = %jsonrpc, "Rejecting request with unsupported JSON-RPC version");
            let err =
                DispatchError::InvalidRequest(format!("Unsupported JSON-RPC version: {jsonrpc}"));
            return Some(JsonRpcResponse::failure(id, err.into()));
        }

        debug!(method = %method, "Handling request");
        let response = match self.dispatch(&method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                match &err {
                    DispatchError::Internal(_) | DispatchError::Timeout { .. } => {
                        error!(method = %method, error = %err, "Request failed")
                    }
                    _ => debug!(method = %method, error = %err, "Request rejected"),
                }
                JsonRpcResponse::failure(id, err.into())
            }
        };
        Some(response)
    }

    async fn shutdown(&self) {
        let discarded = self.tasks().stop();
        info!(discarded, "MCP dispatcher shut down");
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, DispatchError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params)
        .map_err(|err| DispatchError::InvalidParams(format!("Invalid params: {err}")))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, DispatchError> {
    serde_json::to_value(value)
        .map_err(|err| DispatchError::Internal(format!("Failed to encode result: {err}")))
}

// Handlers may return a full `{messages: [...]}` result or just the prompt text.
fn prompt_result(value: Value, description: Option<String>) -> Value {
    if value.get("messages").is_some() {
        return value;
    }
    let text = match value {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let mut result = json!({
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    });
    if let Some(description) = description {
        result["description"] = Value::String(description);
    }
    result
}
