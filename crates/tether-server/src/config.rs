//! Server configuration

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use tether_mcp::protocol::DispatcherConfig;
use tether_mcp::task::DEFAULT_CHANNEL;
use tether_mcp::types::{ServerInfo, MCP_VERSION};

use crate::error::{ServerError, ServerResult};

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binding address
    pub bind: SocketAddr,

    /// MCP configuration
    pub mcp: McpConfig,

    /// CORS configuration
    pub cors: CorsConfig,

    /// Request limits
    pub limits: RequestLimits,
}

/// MCP-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// MCP protocol version to advertise
    pub protocol_version: String,

    /// Server information
    pub server_info: McpServerInfo,

    /// How long a request waits for the execution thread, in milliseconds
    pub main_thread_timeout_ms: u64,

    /// Signal channel the task dispatcher registers on the host
    pub channel_name: String,

    /// Register the built-in demo tools and resources
    pub builtin_items: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerInfo {
    pub name: String,
    pub version: String,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,

    /// Allowed origins (`*` means all)
    pub allowed_origins: Vec<String>,

    /// Max age for preflight requests, in seconds
    pub max_age: u64,
}

/// Request size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 9100)),
            mcp: McpConfig::default(),
            cors: CorsConfig::default(),
            limits: RequestLimits::default(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            protocol_version: MCP_VERSION.to_string(),
            server_info: McpServerInfo::default(),
            main_thread_timeout_ms: 30_000,
            channel_name: DEFAULT_CHANNEL.to_string(),
            builtin_items: true,
        }
    }
}

impl Default for McpServerInfo {
    fn default() -> Self {
        Self {
            name: "Tether MCP Server".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: 3600,
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl McpConfig {
    pub fn main_thread_timeout(&self) -> Duration {
        Duration::from_millis(self.main_thread_timeout_ms)
    }

    /// Settings for the protocol dispatcher
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            protocol_version: self.protocol_version.clone(),
            server_info: ServerInfo {
                name: self.server_info.name.clone(),
                version: self.server_info.version.clone(),
            },
            main_thread_timeout: self.main_thread_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, with `TETHER_` environment overrides
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("TETHER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &Path) -> ServerResult<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ServerError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> ServerResult<()> {
        if self.mcp.main_thread_timeout_ms == 0 {
            return Err(ServerError::Config(
                "mcp.main_thread_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.mcp.channel_name.trim().is_empty() {
            return Err(ServerError::Config("mcp.channel_name must not be empty".to_string()));
        }
        if self.limits.max_body_size == 0 {
            return Err(ServerError::Config(
                "limits.max_body_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
