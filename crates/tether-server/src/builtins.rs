//! Built-in demo tools, resources and prompts

use std::time::Instant;

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use tether_mcp::types::{Prompt, Resource, Tool};
use tether_mcp::{Arguments, HandlerResult, Item, Registry};

use crate::{config::ServerConfig, error::ServerResult};

/// Register the demo items
pub fn register(registry: &Registry, config: &ServerConfig) -> ServerResult<()> {
    registry.register_all(tools())?;
    registry.register_all(resources(config)?)?;
    registry.register_all(prompts())?;
    Ok(())
}

fn tools() -> Vec<Item> {
    let hello_world = Tool::new("hello_world")
        .description("Say hello to someone")
        .input_property(
            "name",
            json!({"type": "string", "description": "Name to say hello to"}),
        );

    let add_numbers = Tool::new("add_numbers")
        .description("Add two numbers together")
        .input_property(
            "a",
            json!({"type": "integer", "description": "First number to add"}),
        )
        .input_property(
            "b",
            json!({"type": "integer", "description": "Second number to add"}),
        )
        .required_input("a")
        .required_input("b")
        .strict_schema();

    let system_info = Tool::new("get_system_info")
        .description("Get basic system information")
        .strict_schema();

    vec![
        Item::tool(hello_world, say_hello),
        // pure arithmetic never touches the host
        Item::tool(add_numbers, add).any_thread(),
        Item::tool(system_info, system_info_handler),
    ]
}

fn resources(config: &ServerConfig) -> ServerResult<Vec<Item>> {
    let started = Instant::now();
    let version = config.mcp.server_info.version.clone();
    let status = move |_: Arguments| -> HandlerResult {
        Ok(json!({
            "status": "running",
            "uptime_seconds": started.elapsed().as_secs(),
            "version": version,
        }))
    };

    let bind = config.bind;
    let timeout_ms = config.mcp.main_thread_timeout_ms;
    let server_config = move |_: Arguments| -> HandlerResult {
        Ok(json!({
            "host": bind.ip().to_string(),
            "port": bind.port(),
            "main_thread_timeout_ms": timeout_ms,
        }))
    };

    Ok(vec![
        Item::resource(
            Resource::json("server://status", "server_status")
                .description("Get server status information"),
            status,
        )?
        .any_thread(),
        Item::resource(
            Resource::json("server://config", "server_config")
                .description("Get server configuration"),
            server_config,
        )?
        .any_thread(),
        Item::resource(
            Resource::template("server://greeting/{name}", "greeting")
                .description("Greeting for the named person")
                .mime_type("text/plain"),
            greeting,
        )?,
    ])
}

fn prompts() -> Vec<Item> {
    let prompt = Prompt::new("summarize_tool")
        .description("Ask the assistant to explain how to use a tool")
        .argument("tool", "Name of the tool to explain", true);
    vec![Item::prompt(prompt, summarize_tool).any_thread()]
}

fn say_hello(args: Arguments) -> HandlerResult {
    let name = args.get("name").and_then(Value::as_str).unwrap_or("World");
    Ok(json!(format!("Hello, {name}!")))
}

fn add(args: Arguments) -> HandlerResult {
    let a = integer_argument(&args, "a")?;
    let b = integer_argument(&args, "b")?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| anyhow!("sum of {a} and {b} overflows"))?;
    Ok(json!(sum))
}

fn system_info_handler(_: Arguments) -> HandlerResult {
    Ok(json!({
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "version": 1,
    }))
}

fn greeting(args: Arguments) -> HandlerResult {
    let name = args
        .get("name")
        .and_then(Value::as_str)
        .context("missing 'name'")?;
    Ok(json!(format!("Hello, {name}!")))
}

fn summarize_tool(args: Arguments) -> HandlerResult {
    let tool = args
        .get("tool")
        .and_then(Value::as_str)
        .context("missing required argument 'tool'")?;
    Ok(json!(format!(
        "Explain what the '{tool}' tool does and give an example call with its arguments."
    )))
}

fn integer_argument(args: &Arguments, name: &str) -> anyhow::Result<i64> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("'{name}' must be an integer"))
}
