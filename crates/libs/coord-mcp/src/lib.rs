use anyhow::Result;
use rmcp::ServiceExt;
use std::path::PathBuf;
use tokio::io::{stdin, stdout};

pub mod tools;
pub use tools::{CoordinationService, ToolSchema};

/// Runs the coordination fabric's MCP tool surface over stdio. This is the
/// transport `coord-agent`'s `serve` subcommand uses.
pub async fn run_stdio(config_root: PathBuf) -> Result<()> {
    tracing::info!("starting coordination MCP server (stdio mode)");

    let service = CoordinationService::new(config_root).await?;
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;

    tracing::info!("MCP server initialized, waiting for requests");
    let quit_reason = server.waiting().await?;
    tracing::info!(?quit_reason, "server shutting down");

    Ok(())
}

pub fn get_tool_schemas() -> Vec<tools::ToolSchema> {
    tools::get_tool_schemas()
}
