//! gss-ad (Admin Dashboard) - read-only survey review
//!
//! Connects to gss.db read-only and serves quota status, completion
//! metrics and respondent records behind a login.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gss_ad::{build_router, db, AppState};
use gss_common::config::{
    admin_credentials, db_path, load_config, resolve_root_folder, ROOT_FOLDER_ENV_VAR,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default listen port
const DEFAULT_PORT: u16 = 5781;

/// Command-line arguments for gss-ad
#[derive(Parser, Debug)]
#[command(name = "gss-ad")]
#[command(about = "Grocery shopper survey admin dashboard")]
#[command(version)]
struct Args {
    /// Configuration file (gss.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory holding gss.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GSS_AD_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gss_ad={0},gss_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting GSS Admin Dashboard (gss-ad) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let credentials = admin_credentials(&config);
    if credentials.is_none() {
        warn!("Admin credentials not configured, dashboard login is disabled");
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV_VAR, &config);
    let db_path = db_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = db::connect_readonly(&db_path).await?;
    info!("Connected to database (read-only mode)");

    let app = build_router(AppState::new(pool, credentials));

    let port = args.port.or(config.admin.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("gss-ad listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
