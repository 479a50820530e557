use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use obsbot::chatbot::{ChatBot, ChatStatus, ProgressCallback};

#[derive(Debug, Parser)]
#[command(name = "obsbot", version, about = "Ask questions about your cluster's metrics")]
pub struct Args {
    /// Config file (default: ~/.obsbot/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model id, e.g. openai/gpt-4o-mini or meta-llama/Llama-3.1-8B-Instruct
    #[arg(long, short)]
    pub model: Option<String>,

    /// API key for hosted providers
    #[arg(long)]
    pub api_key: Option<String>,

    /// Restrict queries to one namespace
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Use a remote MCP server at this URL instead of in-process tools
    #[arg(long)]
    pub mcp_url: Option<String>,

    /// Prometheus/Thanos base URL for in-process tools
    #[arg(long)]
    pub prometheus_url: Option<String>,

    /// Check that the tool backend is reachable and has tools, then exit
    #[arg(long)]
    pub check: bool,

    /// Ask one question and exit
    pub question: Option<String>,
}

fn print_progress(line: &str) {
    eprintln!("  [{}]", line);
}

/// Answer one question; Ctrl-C cancels it.
pub async fn ask(bot: &dyn ChatBot, question: &str, namespace: Option<&str>) -> String {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let progress: &ProgressCallback = &print_progress;
    let outcome = bot
        .converse(question, namespace, Some(progress), &cancel)
        .await;
    watcher.abort();
    if outcome.status == ChatStatus::IterationLimit {
        tracing::warn!(iterations = outcome.iterations, "Stopped at the iteration limit");
    }
    outcome.answer
}

pub async fn run_chat_loop(bot: &dyn ChatBot, namespace: Option<&str>) -> Result<()> {
    println!("Type your question. Type quit or exit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You > ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "/quit" | "/exit") {
            println!("Goodbye!");
            break;
        }
        let answer = ask(bot, input, namespace).await;
        println!("\nAssistant > {}\n", answer);
    }
    Ok(())
}
