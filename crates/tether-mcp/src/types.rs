//! MCP types and protocol definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// JSON-RPC version carried on every message
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version advertised by default
pub const MCP_VERSION: &str = "2024-11-05";

/// JSON-RPC request. A request without an `id` is a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request with the given id
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no response expected)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

// Keeps an explicit `"id": null` distinct from a missing id.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC response carrying either a result or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// MCP error structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Errors raised while building descriptors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("Priority must be between 0.0 and 1.0, got {0}")]
    PriorityOutOfRange(f64),
}

/// Intended audience of an annotated primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    User,
    Assistant,
}

/// Behavioural hints attached to tools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience: Vec<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Annotations {
    pub fn for_user() -> Self {
        Self::default().audience(Audience::User)
    }

    pub fn for_assistant() -> Self {
        Self::default().audience(Audience::Assistant)
    }

    pub fn for_both() -> Self {
        Self::for_user().audience(Audience::Assistant)
    }

    /// Add an audience, ignoring duplicates
    pub fn audience(mut self, audience: Audience) -> Self {
        if !self.audience.contains(&audience) {
            self.audience.push(audience);
        }
        self
    }

    pub fn priority(mut self, priority: f64) -> Result<Self, DescriptorError> {
        if !(0.0..=1.0).contains(&priority) {
            return Err(DescriptorError::PriorityOutOfRange(priority));
        }
        self.priority = Some(priority);
        Ok(self)
    }

    pub fn last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    pub fn modified_now(self) -> Self {
        self.last_modified(Utc::now())
    }
}

/// Tool descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema: empty_object_schema(),
            output_schema: None,
            annotations: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Add a property to the input schema
    pub fn input_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        self.update_schema(|map| {
            let properties = map
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if !properties.is_object() {
                *properties = Value::Object(Map::new());
            }
            if let Value::Object(properties) = properties {
                properties.insert(name, schema);
            }
        });
        self
    }

    /// Mark an input property as required
    pub fn required_input(mut self, name: impl Into<String>) -> Self {
        let name = Value::String(name.into());
        self.update_schema(|map| {
            let required = map
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !required.is_array() {
                *required = Value::Array(Vec::new());
            }
            if let Value::Array(required) = required {
                if !required.contains(&name) {
                    required.push(name);
                }
            }
        });
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.update_schema(|map| {
            map.insert("additionalProperties".to_string(), Value::Bool(allowed));
        });
        self
    }

    /// Reject arguments not declared in the input schema
    pub fn strict_schema(self) -> Self {
        self.additional_properties(false)
    }

    pub fn flexible_schema(self) -> Self {
        self.additional_properties(true)
    }

    fn update_schema(&mut self, update: impl FnOnce(&mut Map<String, Value>)) {
        match &mut self.input_schema {
            Value::Object(map) => update(map),
            other => {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String("object".to_string()));
                update(&mut map);
                *other = Value::Object(map);
            }
        }
    }
}

/// Where a resource lives: one fixed URI or a parameterized template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceAddress {
    #[serde(rename = "uri")]
    Uri(String),
    #[serde(rename = "uriTemplate")]
    Template(String),
}

/// Resource descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(flatten)]
    pub address: ResourceAddress,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Resource {
    /// Resource served under one concrete URI
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_address(ResourceAddress::Uri(uri.into()), name)
    }

    /// Resource addressed through a URI template such as `res://shot{?view,width}`
    pub fn template(template: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_address(ResourceAddress::Template(template.into()), name)
    }

    pub fn text(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uri, name).mime_type("text/plain")
    }

    pub fn json(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uri, name).mime_type("application/json")
    }

    pub fn image(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(uri, name).mime_type("image/png")
    }

    fn with_address(address: ResourceAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            title: None,
            description: None,
            mime_type: None,
            size: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Concrete URI, if this is not a template resource
    pub fn uri(&self) -> Option<&str> {
        match &self.address {
            ResourceAddress::Uri(uri) => Some(uri),
            ResourceAddress::Template(_) => None,
        }
    }

    pub fn uri_template(&self) -> Option<&str> {
        match &self.address {
            ResourceAddress::Template(template) => Some(template),
            ResourceAddress::Uri(_) => None,
        }
    }
}

/// Prompt descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl Prompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            arguments: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required,
        });
        self
    }
}

/// Server identity reported by `initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Capabilities advertised by `initialize`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListChangedCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChangedCapability {
    pub list_changed: bool,
}

/// Result of `initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// Entry of a `tools/list` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

impl From<&Tool> for ToolListEntry {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// `tools/call` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// `resources/read` parameters; extra keys are forwarded to the handler
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `prompts/get` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// Resource read result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReadResult {
    pub contents: Vec<ResourceContent>,
}

/// Resource content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}
