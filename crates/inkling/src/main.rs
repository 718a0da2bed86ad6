use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use inkling::agents::{PaperAssistant, RankingAgent};
use inkling::config::{
    Config, DEFAULT_DATA_DIR, FACTS_SUBDIR, PAPERS_SUBDIR, RANKINGS_SUBDIR, SESSIONS_SUBDIR,
    resolve_path,
};
use inkling::facts::FileFactStore;
use inkling::llm::ModelClient;
use inkling::papers::FilePaperSource;
use inkling::ranking::{FileRankingStore, RankingCache};
use inkling::server::{self, AppState};
use inkling::store::{FileSessionStore, SessionStore};
use inkling::turn::SessionCoordinator;

// ============================================================================
// CLI Types
// ============================================================================

/// Inkling - a self-hosted multi-agent research assistant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "inkling.toml")]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => serve(&config, host, port).await,
    }
}

async fn serve(config_path: &str, host: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("loading config from {config_path}"))?;

    let data_dir = data_dir(Path::new(config_path), &config);
    info!(data_dir = %data_dir.display(), "using data directory");

    // All collaborators are built here and injected; nothing is created
    // lazily behind a global.
    let session_store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::with_limits(
        data_dir.join(SESSIONS_SUBDIR),
        config.session.history_limit,
        Duration::hours(config.session.history_ttl_hours),
    ));
    let model = Arc::new(ModelClient::new(
        &config.model.base_url,
        config.model.api_key.clone(),
        &config.model.name,
    ));
    let cache = RankingCache::new(Arc::new(FileRankingStore::new(
        data_dir.join(RANKINGS_SUBDIR),
    )));
    let ranking_agent = RankingAgent::new(
        Arc::new(FilePaperSource::new(data_dir.join(PAPERS_SUBDIR))),
        model.clone(),
        cache,
        session_store.clone(),
        config.ranking.scoring_concurrency,
    );
    let pipeline = Arc::new(PaperAssistant::new(
        model,
        ranking_agent,
        session_store.clone(),
        Arc::new(FileFactStore::new(data_dir.join(FACTS_SUBDIR))),
    ));

    let state = AppState {
        coordinator: Arc::new(SessionCoordinator::new(session_store)),
        pipeline,
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
    };
    let app = server::build_app(
        state,
        config.server.request_timeout_seconds,
        config.server.max_connections,
    );

    let host = host
        .map(|h| h.to_string())
        .unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(addr = %addr, "inkling listening");

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}

fn data_dir(config_path: &Path, config: &Config) -> PathBuf {
    match &config.data_dir {
        Some(dir) => resolve_path(config_path, dir),
        None => resolve_path(config_path, Path::new(DEFAULT_DATA_DIR)),
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
