//! mint-sim - synthetic headset server
//!
//! Serves `ws://<host>:<port>/` with a stream of random EEG-like batches and
//! `GET /health` for liveness checks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mint_common::config::ConfigResolver;
use mint_sim::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mint-sim
#[derive(Parser, Debug)]
#[command(name = "mint-sim")]
#[command(about = "Synthetic EEG headset WebSocket server")]
#[command(version)]
struct Args {
    /// Config file path (overrides MINT_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind
    #[arg(long, env = "MINT_SIM_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MINT_SIM_PORT")]
    port: Option<u16>,

    /// Batches sent per second on each connection
    #[arg(long)]
    batches_per_second: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting mint-sim v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let settings = &mut config.simulator;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(bps) = args.batches_per_second {
        settings.batches_per_second = bps;
    }
    config.validate().context("Invalid configuration")?;

    let settings = config.simulator;
    let addr = format!("{}:{}", settings.host, settings.port);
    info!(
        "Streaming {} channels x {} points at {} batches/s",
        settings.channels, settings.batch_size, settings.batches_per_second
    );

    let app = build_router(AppState::new(settings));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("mint-sim listening on ws://{}", addr);
    info!("Health check: http://{}/health", addr);

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
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
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
