use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatrelay::config::Config;
use chatrelay::llm::ProviderRegistry;
use chatrelay::server::{self, AppState};
use chatrelay::setup;

#[derive(Parser)]
#[command(name = "chatrelay", version, about = "HTTP relay between a chat UI and LLM providers")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true, default_value = "chatrelay.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (the default).
    Serve,
    /// Interactively create the config file.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Init => setup::run(&cli.config).await,
        Command::Serve => serve(&cli.config).await,
    }
}

async fn serve(config_path: &Path) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env();

    if config.auth_token.as_deref().is_none_or(str::is_empty) {
        anyhow::bail!(
            "no auth token configured; run `chatrelay init` or set CHATRELAY_AUTH_TOKEN"
        );
    }

    let providers = ProviderRegistry::from_config(&config);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let request_timeout = config.server.request_timeout_seconds;

    let state = AppState {
        config: Arc::new(config),
        providers,
    };
    let app = server::build_app(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
