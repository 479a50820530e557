mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use obsbot::config::{AppConfig, ToolMode};
use obsbot::executor::{McpClientAdapter, McpServerAdapter, ToolExecutor};
use obsbot::factory::create_chatbot_with;
use obsbot::mcp::{HttpMcpClient, HttpMcpConfig};
use obsbot::tools::{create_observability_server, PrometheusClient};

/// Build the tool executor selected by config.
fn create_executor(config: &AppConfig) -> Result<Arc<dyn ToolExecutor>> {
    match config.tools.mode {
        ToolMode::Server => {
            let client = PrometheusClient::new(
                config.tools.prometheus_url.clone(),
                config.tools.prometheus_token.clone(),
                config.tool_timeout(),
            )?;
            let server = create_observability_server(client);
            Ok(Arc::new(McpServerAdapter::new(Arc::new(server))))
        }
        ToolMode::Client => {
            let mut mcp = HttpMcpConfig::new(config.tools.mcp_url.clone());
            mcp.auth_token = config.tools.mcp_auth_token.clone();
            mcp.timeout = config.tool_timeout();
            let client = HttpMcpClient::new(mcp).context("Failed to create MCP client")?;
            Ok(Arc::new(McpClientAdapter::new(Arc::new(client))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obsbot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(url) = &args.prometheus_url {
        config.tools.prometheus_url = url.clone();
        config.tools.mode = ToolMode::Server;
    }
    if let Some(url) = &args.mcp_url {
        config.tools.mcp_url = url.clone();
        config.tools.mode = ToolMode::Client;
    }

    let model = config.resolve_model(args.model.as_deref().unwrap_or(&config.llm.model));
    let api_key = config.api_key(&model, args.api_key.as_deref());
    let executor = create_executor(&config)?;
    tracing::info!(model = %model, tools = executor.transport(), "Starting obsbot");

    let bot = create_chatbot_with(
        &model,
        api_key.as_deref(),
        Some(executor),
        &config.chatbot_settings(),
    )?;

    if args.check {
        if !bot.test_tools().await {
            bail!("Tool backend is not ready (mode: {:?})", config.tools.mode);
        }
        println!("Tool backend ready");
        return Ok(());
    }

    let namespace = args.namespace.as_deref();
    match &args.question {
        Some(question) => println!("{}", cli::ask(bot.as_ref(), question, namespace).await),
        None => cli::run_chat_loop(bot.as_ref(), namespace).await?,
    }

    Ok(())
}
