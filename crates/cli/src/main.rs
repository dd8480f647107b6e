//! Questline CLI
//!
//! Main entry point for the questline command-line tool: grounded answers
//! to player questions from a curated knowledge base.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::ask::user_facing;
use commands::{AskCommand, ChatCommand, SourcesCommand};
use questline_core::{config::AppConfig, logging};
use questline_rag::{ChatService, ServiceContext};
use std::path::PathBuf;
use std::sync::Arc;

/// Questline - grounded answers from a curated game knowledge base
#[derive(Parser, Debug)]
#[command(name = "questline")]
#[command(about = "Grounded answers from a curated game knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "QUESTLINE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "QUESTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, claude)
    #[arg(short, long, global = true, env = "QUESTLINE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "QUESTLINE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Chat interactively with session memory
    Chat(ChatCommand),

    /// Show the citations parsed from a document
    Sources(SourcesCommand),
}

fn build_service(config: &AppConfig) -> anyhow::Result<Arc<ChatService>> {
    config.validate().context("Invalid configuration")?;
    let context = ServiceContext::from_workspace(&config.workspace, config)
        .context("Failed to set up the answer pipeline")?;
    Ok(Arc::new(ChatService::new(context)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()
        .context("Failed to load configuration")?
        .with_overrides(
            cli.workspace,
            cli.config,
            cli.provider,
            cli.model,
            cli.log_level,
            cli.verbose,
            cli.no_color,
        );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Questline CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Chat(_) => "chat",
        Commands::Sources(_) => "sources",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(build_service(&config)?).await,
        Commands::Chat(cmd) => cmd.execute(build_service(&config)?).await,
        Commands::Sources(cmd) => cmd.execute().await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.map_err(|e| anyhow::anyhow!(user_facing(&e)))
}
