use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chorus_core::{ConnectorRegistry, InMemorySessionStore, Message, Orchestrator};
use chorus_gateway::GatewayServer;

mod config;

use config::ChorusConfig;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(version)]
#[command(about = "Chorus: one chat endpoint in front of several LLMs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Start,

    /// Send a one-shot message and print the reply
    Ask {
        /// The message to send
        message: String,

        /// Model to use (qwen, deepseek, mistral); routed automatically if omitted
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins when present
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Ask { message, model } => cmd_ask(&cli.config, &message, model.as_deref()).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Chorus initialized at {}", config_dir.display());
    println!(
        "Set OPENROUTER_API_KEY or edit {} to configure providers.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn build_orchestrator(cfg: &ChorusConfig) -> Result<Orchestrator> {
    let registry = ConnectorRegistry::from_settings(cfg.connector_settings(), cfg.request_timeout())
        .context("Failed to initialize connectors")?;

    Ok(Orchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(registry),
        cfg.orchestrator_config(),
    ))
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    info!("Starting Chorus gateway...");

    let bind = cfg.bind_addr()?;
    let orchestrator = Arc::new(build_orchestrator(&cfg)?);
    let server = GatewayServer::new(bind, orchestrator)
        .with_cors_origins(cfg.server.cors_origins.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone().cancelled_owned();

    let mut server_task = tokio::spawn(server.run(shutdown));

    // Bind failures end the server before any signal arrives
    let finished = tokio::select! {
        signal = signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
            None
        }
        result = &mut server_task => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => server_task.await,
    };
    result.context("Gateway task failed")??;

    println!("Chorus stopped.");
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str, model: Option<&str>) -> Result<()> {
    let cfg = ChorusConfig::load(config_path)?;
    let orchestrator = build_orchestrator(&cfg)?;

    if orchestrator.connectors().is_empty() {
        anyhow::bail!("No LLM connectors available. Set OPENROUTER_API_KEY or edit the config.");
    }

    let reply = orchestrator
        .chat(model, vec![Message::user(message)], None)
        .await?;

    info!("Answered by {} (session {})", reply.model, reply.session_id);
    println!("{}", reply.reply);
    Ok(())
}
