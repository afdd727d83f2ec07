//! Tether Server - MCP over HTTP for single-threaded hosts
//!
//! The process main thread plays the host's execution thread: it drives the
//! signal loop while the HTTP server runs on a tokio worker pool.

use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tether_mcp::{MainThreadQueue, SignalHost};
use tether_server::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    server::{shutdown_signal, TetherServer},
};

/// Command line arguments
#[derive(Parser)]
#[command(
    name = "tether-server",
    about = "MCP server that runs host handlers on a single execution thread",
    long_about = "Serves the Model Context Protocol over HTTP. Tools, resources and prompts marked main-thread-only are executed one at a time on the process main thread; everything else runs on the worker pool."
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server bind address (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start,
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "tether-server.toml")]
        output: PathBuf,
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show server information
    Info,
}

fn main() -> ServerResult<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    match &args.command {
        Some(Commands::Config { output, force }) => generate_config(output, *force),
        Some(Commands::Validate { config }) => validate_config(config),
        Some(Commands::Info) => {
            show_info();
            Ok(())
        }
        Some(Commands::Start) | None => start_server(&args),
    }
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> ServerResult<()> {
    let log_level = args
        .log_level
        .parse::<Level>()
        .map_err(|_| ServerError::Config(format!("Invalid log level: {}", args.log_level)))?;

    let mut env_filter = EnvFilter::from_default_env();
    for target in ["tether_server", "tether_mcp"] {
        let directive = format!("{target}={log_level}")
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid log directive: {e}")))?;
        env_filter = env_filter.add_directive(directive);
    }

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(env_filter)
            .init();
    }

    Ok(())
}

fn load_config(args: &Args) -> ServerResult<ServerConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {:?}", config_path);
        ServerConfig::from_file(config_path)
            .map_err(|e| ServerError::Config(format!("Failed to load config: {e}")))?
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };

    if let Some(bind) = &args.bind {
        config.bind = bind
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid bind address: {e}")))?;
    }
    Ok(config)
}

/// Run the HTTP server on a worker runtime while this thread drives the
/// execution loop
fn start_server(args: &Args) -> ServerResult<()> {
    info!("Starting Tether Server v{}", tether_server::VERSION);
    let config = load_config(args)?;

    let (queue, execution) = MainThreadQueue::new();
    let queue = Arc::new(queue);
    let server = TetherServer::new(config, Arc::clone(&queue) as Arc<dyn SignalHost>)?;

    info!("Server configuration:");
    info!("  Bind address: {}", server.config().bind);
    info!("  Main thread timeout: {} ms", server.config().mcp.main_thread_timeout_ms);
    info!("  Signal channel: {}", server.config().mcp.channel_name);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tether-worker")
        .build()?;

    let closer = Arc::clone(&queue);
    let serving = runtime.spawn(async move {
        let result = server.start(shutdown_signal()).await;
        // unblocks the execution loop below
        closer.close();
        result
    });

    let delivered = execution.run();
    info!(delivered, "Execution loop drained");

    match runtime.block_on(serving) {
        Ok(result) => result,
        Err(e) => {
            error!("Server task failed: {}", e);
            Err(ServerError::Internal(format!("Server task failed: {e}")))
        }
    }
}

/// Generate a default configuration file
fn generate_config(output: &PathBuf, force: bool) -> ServerResult<()> {
    if output.exists() && !force {
        error!("Configuration file already exists: {:?}", output);
        error!("Use --force to overwrite");
        return Err(ServerError::Config(
            "Configuration file already exists".to_string(),
        ));
    }

    ServerConfig::default().to_file(output)?;
    info!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Validate a configuration file
fn validate_config(config_path: &PathBuf) -> ServerResult<()> {
    info!("Validating configuration file: {:?}", config_path);

    let config = ServerConfig::from_file(config_path).map_err(|e| {
        error!("Configuration validation failed: {}", e);
        ServerError::Config(format!("Invalid configuration: {e}"))
    })?;
    config.validate()?;

    info!("Configuration is valid");
    info!("  Bind address: {}", config.bind);
    info!("  Protocol version: {}", config.mcp.protocol_version);
    info!("  Main thread timeout: {} ms", config.mcp.main_thread_timeout_ms);
    info!("  Built-in items: {}", config.mcp.builtin_items);
    Ok(())
}

/// Show server information
fn show_info() {
    println!("Tether Server v{}", tether_server::VERSION);
    println!("MCP over HTTP for hosts with a single execution thread");
    println!();
    println!("Endpoints:");
    println!("  POST /          MCP JSON-RPC requests");
    println!("  GET  /          Endpoint overview");
    println!("  GET  /tools     Tool listing");
    println!("  GET  /health    Health check");
    println!();
    println!("Configuration:");
    println!("  • Default bind address: 127.0.0.1:9100");
    println!("  • Environment overrides: TETHER_<SECTION>__<KEY>");
    println!("  • Configuration file: tether-server.toml");
    println!();
    println!("Usage:");
    println!("  tether-server                       # Start with default config");
    println!("  tether-server -c config.toml        # Start with custom config");
    println!("  tether-server config                # Generate default config");
    println!("  tether-server validate config.toml  # Validate config file");
}
