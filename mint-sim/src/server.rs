//! WebSocket server half of the stream protocol
//!
//! Each connection gets its own generator task. The read loop handles:
//! - `clientClosing`: stop the generator, wait for it, reply `confirmed closing`
//! - a JSON processing config: band-pass and downsampling applied to the
//!   generator from the next batch on
//! - anything else: logged and ignored

use crate::generator::SignalGenerator;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use mint_common::config::SimulatorSettings;
use mint_common::protocol::{ClientMessage, CONFIRMED_CLOSING};
use mint_common::ProcessingConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsSink = SplitSink<WebSocket, Message>;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SimulatorSettings>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connections currently being served
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub connections: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "mint-sim".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.connection_count(),
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Stop signal and task for one connection's batch stream
struct Broadcast {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Option<WsSink>>,
}

impl Broadcast {
    /// Stop the stream and take the sink back
    async fn finish(self, id: Uuid) -> Option<WsSink> {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(sink) => sink,
            Err(e) => {
                error!("[{}] Broadcast task failed: {}", id, e);
                None
            }
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    let live = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    info!("[{}] Client connected ({} live)", id, live);

    let (sink, mut stream) = socket.split();
    let (config_tx, config_rx) = watch::channel(None::<ProcessingConfig>);
    let (stop_tx, stop_rx) = oneshot::channel();

    let generator = SignalGenerator::new(&state.settings);
    let mut broadcast = Some(Broadcast {
        stop: stop_tx,
        task: tokio::spawn(stream_batches(
            id,
            sink,
            generator,
            state.settings.batch_interval(),
            config_rx,
            stop_rx,
        )),
    });
    let mut idle_sink: Option<WsSink> = None;

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientMessage::parse(text.as_str()) {
                Ok(ClientMessage::Closing) => {
                    info!("[{}] Close requested", id);
                    if let Some(running) = broadcast.take() {
                        idle_sink = running.finish(id).await;
                    }
                    match idle_sink.as_mut() {
                        Some(sink) => {
                            if let Err(e) = sink.send(Message::Text(CONFIRMED_CLOSING.into())).await {
                                warn!("[{}] Failed to confirm close: {}", id, e);
                            } else {
                                info!("[{}] Close confirmed", id);
                            }
                        }
                        None => warn!("[{}] Socket unavailable, cannot confirm close", id),
                    }
                }
                Ok(ClientMessage::Configure(config)) => {
                    info!(
                        "[{}] Processing config received (bandpass={}, iir={}, band={:?}..{:?} Hz, downsample={:?})",
                        id,
                        config.apply_bandpass,
                        config.use_iir,
                        config.l_freq,
                        config.h_freq,
                        config.downsample_factor
                    );
                    config_tx.send_replace(Some(config));
                }
                Err(e) => warn!("[{}] Ignoring message: {}", id, e),
            },
            Ok(Message::Close(_)) => {
                debug!("[{}] Close frame received", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("[{}] Read error (client likely disconnected): {}", id, e);
                break;
            }
        }
    }

    if let Some(running) = broadcast.take() {
        running.finish(id).await;
    }
    let live = state.connections.fetch_sub(1, Ordering::SeqCst) - 1;
    info!("[{}] Client disconnected ({} live)", id, live);
}

/// Send one batch per interval until stopped or the socket fails
///
/// Returns the sink when stopped on request so the caller can keep writing.
async fn stream_batches(
    id: Uuid,
    mut sink: WsSink,
    mut generator: SignalGenerator,
    interval: std::time::Duration,
    config: watch::Receiver<Option<ProcessingConfig>>,
    mut stop: oneshot::Receiver<()>,
) -> Option<WsSink> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("[{}] Broadcast stopped after {} samples", id, generator.samples_generated());
                return Some(sink);
            }
            _ = ticker.tick() => {
                let current = config.borrow().clone();
                let batch = generator.next_batch(current.as_ref());

                let text = match serde_json::to_string(&batch) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("[{}] Failed to serialize batch: {}", id, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!("[{}] Broadcast ended: {}", id, e);
                    return None;
                }
            }
        }
    }
}
