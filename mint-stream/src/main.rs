//! mint-stream - headless streaming client
//!
//! Builds the default pipeline (source → filter → ml, filter → chart),
//! streams from the configured producer for a bounded time and logs the
//! render window once per second. Ctrl+C stops the stream gracefully.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mint_common::config::{ConfigResolver, DrainPolicy};
use mint_common::events::StreamState;
use mint_graph::{FilterSettings, FilterType, Node, SharedGraph};
use mint_stream::PipelineSession;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mint-stream
#[derive(Parser, Debug)]
#[command(name = "mint-stream")]
#[command(about = "Headless EEG stream client")]
#[command(version)]
struct Args {
    /// Config file path (overrides MINT_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket URL of the signal producer
    #[arg(short, long, env = "MINT_STREAM_URL")]
    url: Option<String>,

    /// Streaming duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Render window size in points
    #[arg(long)]
    chart_size: Option<usize>,

    /// Drain all pending points on every tick instead of pacing them
    #[arg(long)]
    latest: bool,
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
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting mint-stream v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(url) = args.url {
        config.stream.url = url;
    }
    if let Some(chart_size) = args.chart_size {
        config.stream.chart_size = chart_size;
    }
    if args.latest {
        config.stream.drain_policy = DrainPolicy::Latest;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Producer: {} (chart size {}, {} ticks/s)",
        config.stream.url, config.stream.chart_size, config.stream.batches_per_second
    );

    let graph = build_default_pipeline()
        .await
        .context("Failed to build pipeline")?;
    let session = PipelineSession::from_config(graph, &config);
    let mut state_rx = session.stream().subscribe_state();

    session.set_streaming(true);

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Streaming duration of {}s elapsed", args.duration);
                break;
            }
            _ = &mut shutdown => break,
            _ = report.tick() => log_window(&session),
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if !session.context().is_streaming() && *state_rx.borrow() == StreamState::Idle {
                    warn!("Stream ended before the requested duration");
                    break;
                }
            }
        }
    }

    session.set_streaming(false);
    let grace = config.stream.close_timeout() + Duration::from_secs(1);
    let closed = tokio::time::timeout(
        grace,
        state_rx.wait_for(|state| *state == StreamState::Idle),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);
    if !closed {
        warn!("Stream did not close within {:?}", grace);
    }

    if let Ok(stats) = session.stream().stats().await {
        info!(
            "Session stats: {} batches, {} rejected, {} points drained, {} connection(s)",
            stats.batches_received,
            stats.batches_rejected,
            stats.points_drained,
            stats.connections_opened
        );
    }

    session.shutdown().await;
    info!("mint-stream stopped");
    Ok(())
}

async fn build_default_pipeline() -> Result<SharedGraph> {
    let graph = SharedGraph::default();
    graph.add_node(Node::source("source")).await?;
    graph.add_node(Node::filter("filter")).await?;
    graph.add_node(Node::ml("ml")).await?;
    graph.add_node(Node::chart("chart")).await?;

    graph
        .set_filter_settings(
            "filter",
            FilterSettings {
                filter_type: FilterType::Bandpass,
                l_freq: Some(1.0),
                h_freq: Some(40.0),
                ..Default::default()
            },
        )
        .await?;

    for (source, target) in [("source", "filter"), ("filter", "ml"), ("filter", "chart")] {
        if !graph.add_edge(source, target).await {
            anyhow::bail!("edge {} -> {} rejected", source, target);
        }
    }
    Ok(graph)
}

fn log_window(session: &PipelineSession) {
    let window = session.stream().render_window();
    match window.last() {
        Some(point) => info!(
            "Render window: {} points, latest t={:.3} {:?}",
            window.len(),
            point.time,
            point.signals
        ),
        None => info!("Render window empty (state {})", session.stream().state()),
    }
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
        _ = ctrl_c => info!("Received Ctrl+C, stopping stream"),
        _ = terminate => info!("Received terminate signal, stopping stream"),
    }
}
