//! Core server implementation

use crate::{
    builtins,
    config::{CorsConfig, ServerConfig},
    error::{ServerError, ServerResult},
    handlers,
};

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::{future::Future, sync::Arc, time::Duration};
use tether_mcp::{McpDispatcher, McpProtocol, Registry, SignalHost, TaskDispatcher};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub protocol: Arc<dyn McpProtocol>,
    pub registry: Arc<Registry>,
    pub tasks: Arc<TaskDispatcher>,
}

/// Tether HTTP server
pub struct TetherServer {
    config: Arc<ServerConfig>,
    state: ServerState,
}

impl TetherServer {
    /// Create a server whose main-thread handlers run through `host`
    pub fn new(config: ServerConfig, host: Arc<dyn SignalHost>) -> ServerResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let registry = Arc::new(Registry::new());
        let tasks = Arc::new(TaskDispatcher::with_channel(
            host,
            config.mcp.channel_name.clone(),
        ));
        let dispatcher = McpDispatcher::new(
            config.mcp.dispatcher_config(),
            Arc::clone(&registry),
            Arc::clone(&tasks),
        );

        if config.mcp.builtin_items {
            builtins::register(&registry, &config)?;
        }

        let state = ServerState {
            config: Arc::clone(&config),
            protocol: Arc::new(dispatcher),
            registry,
            tasks,
        };

        Ok(Self { config, state })
    }

    /// Registry for adding host tools before the server starts
    pub fn registry(&self) -> &Arc<Registry> {
        &self.state.registry
    }

    pub fn tasks(&self) -> &Arc<TaskDispatcher> {
        &self.state.tasks
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then discard pending main-thread work
    pub async fn start<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.state.tasks.start()?;

        let app = self.router();
        let addr = self.config.bind;
        let listener = TcpListener::bind(addr).await?;
        info!(
            %addr,
            tools = self.state.registry.count(tether_mcp::Category::Tool),
            resources = self.state.registry.count(tether_mcp::Category::Resource),
            "Tether MCP server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {e}")));

        self.state.protocol.shutdown().await;
        info!("Tether MCP server stopped");
        served
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

/// Router with the MCP endpoint, debug endpoints and middleware
pub fn create_router(state: ServerState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::mcp::index).post(handlers::mcp::rpc))
        .route("/tools", get(handlers::mcp::list_tools))
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_size))
        .layer(TraceLayer::new_for_http());

    if state.config.cors.enabled {
        router = router.layer(cors_layer(&state.config.cors));
    }

    router.with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(config.max_age))
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
