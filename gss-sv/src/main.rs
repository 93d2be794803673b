//! gss-sv (Survey Service) - respondent-facing survey API
//!
//! Opens (creating on first run) gss.db in the root folder, seeds quota
//! targets and the trade area, then serves the survey flow.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gss_common::config::{
    db_path, load_config, load_trade_area, quota_targets, resolve_root_folder, ROOT_FOLDER_ENV_VAR,
};
use gss_common::db::{init_database, seed_zip_codes};
use gss_sv::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default listen port
const DEFAULT_PORT: u16 = 5780;

/// Command-line arguments for gss-sv
#[derive(Parser, Debug)]
#[command(name = "gss-sv")]
#[command(about = "Grocery shopper survey service")]
#[command(version)]
struct Args {
    /// Configuration file (gss.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory holding gss.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GSS_SV_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gss_sv={0},gss_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting GSS Survey Service (gss-sv) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV_VAR, &config);
    let db_path = db_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let quotas = quota_targets(&config)?;
    let pool = init_database(&db_path, &quotas)
        .await
        .context("Failed to initialize database")?;

    match &config.trade_area_file {
        Some(path) => {
            let entries = load_trade_area(path)?;
            seed_zip_codes(&pool, &entries).await?;
        }
        None => warn!("No trade_area_file configured, ZIP screening uses existing zip_lookup rows"),
    }

    let app = build_router(AppState::new(pool));

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("gss-sv listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
