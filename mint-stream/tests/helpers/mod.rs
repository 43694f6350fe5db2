//! In-process WebSocket peer for coordinator tests

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use mint_common::config::DrainPolicy;
use mint_common::events::{EventBus, MintEvent, StreamState};
use mint_common::protocol::{CLIENT_CLOSING, CONFIRMED_CLOSING};
use mint_stream::{CoordinatorConfig, StreamHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(3);

/// How the peer answers `clientClosing`
#[derive(Debug, Clone, Copy)]
pub enum AckMode {
    Immediate,
    Delayed(Duration),
    Never,
}

/// Scripted stream producer
///
/// Every accepted connection is sent its script in order, then the peer
/// records all text it receives and answers close requests per `ack`.
pub struct MockPeer {
    pub url: String,
    received: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl MockPeer {
    /// Same script on every connection
    pub async fn start(ack: AckMode, script: Vec<String>) -> Self {
        Self::start_sequence(ack, vec![script]).await
    }

    /// Connection `n` gets `scripts[n]`; later connections repeat the last one
    pub async fn start_sequence(ack: AckMode, scripts: Vec<Vec<String>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let peer = Self {
            url,
            received: Arc::new(Mutex::new(Vec::new())),
            accepted: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
        };

        let received = Arc::clone(&peer.received);
        let accepted = Arc::clone(&peer.accepted);
        let live = Arc::clone(&peer.live);
        let max_live = Arc::clone(&peer.max_live);

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                let index = accepted.fetch_add(1, Ordering::SeqCst);
                let script = scripts
                    .get(index)
                    .or(scripts.last())
                    .cloned()
                    .unwrap_or_default();
                let now_live = live.fetch_add(1, Ordering::SeqCst) + 1;
                max_live.fetch_max(now_live, Ordering::SeqCst);

                tokio::spawn(serve(
                    ws,
                    ack,
                    script,
                    Arc::clone(&received),
                    Arc::clone(&live),
                ));
            }
        });

        peer
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Highest number of connections held at once
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Wait until the peer has received a message matching `pred`
    pub async fn wait_received(&self, pred: impl Fn(&str) -> bool) -> bool {
        timeout(WAIT, async {
            loop {
                if self.received().iter().any(|m| pred(m)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}

async fn serve<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    ack: AckMode,
    script: Vec<String>,
    received: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut tx, mut rx) = ws.split();
    let mut released = false;

    for text in script {
        if tx.send(Message::text(text)).await.is_err() {
            break;
        }
    }

    while let Some(Ok(msg)) = rx.next().await {
        match msg {
            Message::Text(text) => {
                let text = text.as_str().to_string();
                received.lock().unwrap().push(text.clone());
                if text != CLIENT_CLOSING {
                    continue;
                }
                match ack {
                    AckMode::Immediate => {}
                    AckMode::Delayed(delay) => tokio::time::sleep(delay).await,
                    AckMode::Never => continue,
                }
                // The client drops this connection once acknowledged
                live.fetch_sub(1, Ordering::SeqCst);
                released = true;
                let _ = tx.send(Message::text(CONFIRMED_CLOSING)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if !released {
        live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Coordinator settings suited to tests: fast ticks, no session limit
pub fn test_config(url: &str, chart_size: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        url: url.to_string(),
        chart_size,
        drain_interval: Duration::from_millis(20),
        close_timeout: Duration::from_millis(2000),
        session_limit: None,
        drain_policy: DrainPolicy::Paced,
    }
}

pub fn batch_json(timestamps: &[f64], signals: &[&[f64]]) -> String {
    serde_json::json!({ "timestamps": timestamps, "signals": signals }).to_string()
}

pub async fn wait_state(handle: &StreamHandle, state: StreamState) -> bool {
    let mut rx = handle.subscribe_state();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}

/// Next event matching `pred`, skipping others
pub async fn next_event(
    rx: &mut broadcast::Receiver<MintEvent>,
    within: Duration,
    pred: impl Fn(&MintEvent) -> bool,
) -> Option<MintEvent> {
    timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// All state transitions seen so far, in order
pub fn drain_transitions(rx: &mut broadcast::Receiver<MintEvent>) -> Vec<(StreamState, StreamState)> {
    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let MintEvent::StreamStateChanged {
            old_state,
            new_state,
            ..
        } = event
        {
            transitions.push((old_state, new_state));
        }
    }
    transitions
}

pub fn bus() -> EventBus {
    EventBus::new(1024)
}
