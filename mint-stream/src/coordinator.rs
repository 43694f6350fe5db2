//! Streaming buffer coordinator
//!
//! A single task owns the WebSocket, the accumulation buffer, the render
//! window and both timers (drain interval and close timeout). Socket reads,
//! drain ticks and commands are handled one at a time on that task, so no
//! locking is needed.
//!
//! # Connection lifecycle
//!
//! ```text
//! Idle → Connecting → Open → ClosingGraceful → Closed → Idle
//! ```
//!
//! - Streaming on with no connection: connect.
//! - Streaming off while `Connecting`: the connect attempt is dropped.
//! - Streaming off while `Open`: send `clientClosing`, start the close timeout.
//! - `confirmed closing` or timeout: close the socket, `Closed`, then `Idle`.
//! - Streaming on again while `ClosingGraceful`: wait for `Closed`, then open a
//!   fresh connection. At most one socket is ever held.
//! - Connection errors end the session and turn streaming off; there is no
//!   automatic reconnect.

use crate::buffer::StreamBuffer;
use crate::context::StreamingContext;
use crate::error::{Result, StreamError};
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use mint_common::config::{DrainPolicy, StreamSettings};
use mint_common::events::{EventBus, MintEvent, StreamState};
use mint_common::protocol::{ClientMessage, ServerMessage};
use mint_common::{ProcessingConfig, SignalPoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = BoxFuture<'static, Result<WsStream>>;

/// Render window as published to observers
pub type RenderWindow = Arc<Vec<SignalPoint>>;

const COMMAND_CAPACITY: usize = 32;

/// Shortest drain period; `tokio::time::interval` rejects zero
const MIN_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// Coordinator tuning, usually taken from `[stream]` settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub url: String,
    pub chart_size: usize,
    pub drain_interval: Duration,
    pub close_timeout: Duration,
    pub session_limit: Option<Duration>,
    pub drain_policy: DrainPolicy,
}

impl From<&StreamSettings> for CoordinatorConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            chart_size: settings.chart_size,
            drain_interval: settings.drain_interval(),
            close_timeout: settings.close_timeout(),
            session_limit: settings.session_limit(),
            drain_policy: settings.drain_policy,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

/// Counters kept by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub batches_received: u64,
    pub batches_rejected: u64,
    pub points_drained: u64,
    pub connections_opened: u64,
}

enum Command {
    SendConfig(ProcessingConfig),
    Stats(oneshot::Sender<StreamStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Socket ownership, one variant at a time
enum Link {
    None,
    Connecting(ConnectFuture),
    Connected(WsStream),
}

/// Cloneable handle to a running coordinator
#[derive(Clone)]
pub struct StreamHandle {
    commands: mpsc::Sender<Command>,
    context: StreamingContext,
    state: watch::Receiver<StreamState>,
    window: watch::Receiver<RenderWindow>,
}

impl StreamHandle {
    /// Turn streaming on or off
    ///
    /// Equivalent to flipping the shared [`StreamingContext`] flag.
    pub fn set_streaming(&self, enabled: bool) {
        self.context.set_streaming(enabled);
    }

    pub fn is_streaming(&self) -> bool {
        self.context.is_streaming()
    }

    /// Store a processing config; it is transmitted now if the connection is
    /// open, otherwise as soon as it opens
    pub async fn send_processing_config(&self, config: ProcessingConfig) -> Result<()> {
        self.commands
            .send(Command::SendConfig(config))
            .await
            .map_err(|_| StreamError::CoordinatorStopped)
    }

    /// Current connection state
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Watch receiver that sees every published state
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Snapshot of the render window, oldest point first
    pub fn render_window(&self) -> RenderWindow {
        Arc::clone(&self.window.borrow())
    }

    /// Watch receiver updated after each drain tick that moved points
    pub fn subscribe_window(&self) -> watch::Receiver<RenderWindow> {
        self.window.clone()
    }

    /// Counters as of now
    ///
    /// # Errors
    ///
    /// [`StreamError::CoordinatorStopped`] once the coordinator has shut down.
    pub async fn stats(&self) -> Result<StreamStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(tx))
            .await
            .map_err(|_| StreamError::CoordinatorStopped)?;
        rx.await.map_err(|_| StreamError::CoordinatorStopped)
    }

    /// Stop the coordinator, closing any held connection
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Spawns the coordinator task
pub struct StreamCoordinator;

impl StreamCoordinator {
    /// Start a coordinator following `context`'s streaming flag
    pub fn spawn(
        config: CoordinatorConfig,
        context: StreamingContext,
        event_bus: EventBus,
    ) -> StreamHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let (window_tx, window_rx) = watch::channel(RenderWindow::default());

        let actor = Coordinator {
            buffer: StreamBuffer::with_policy(config.chart_size, config.drain_policy),
            flag: context.subscribe(),
            context: context.clone(),
            config,
            event_bus,
            commands: cmd_rx,
            state: StreamState::Idle,
            state_tx,
            window_tx,
            link: Link::None,
            drain: None,
            close_deadline: None,
            session_deadline: None,
            pending_config: None,
            stats: StreamStats::default(),
        };
        tokio::spawn(actor.run());

        StreamHandle {
            commands: cmd_tx,
            context,
            state: state_rx,
            window: window_rx,
        }
    }
}

struct Coordinator {
    config: CoordinatorConfig,
    context: StreamingContext,
    flag: watch::Receiver<bool>,
    event_bus: EventBus,
    commands: mpsc::Receiver<Command>,

    state: StreamState,
    state_tx: watch::Sender<StreamState>,
    window_tx: watch::Sender<RenderWindow>,

    buffer: StreamBuffer,
    link: Link,
    drain: Option<Interval>,
    close_deadline: Option<Instant>,
    session_deadline: Option<Instant>,
    pending_config: Option<ProcessingConfig>,
    stats: StreamStats,
}

/// Progress on whatever the link is doing
enum LinkEvent {
    Connected(Result<WsStream>),
    Message(Option<std::result::Result<Message, tungstenite::Error>>),
}

async fn link_event(link: &mut Link) -> LinkEvent {
    match link {
        Link::Connecting(fut) => LinkEvent::Connected(fut.await),
        Link::Connected(ws) => LinkEvent::Message(ws.next().await),
        Link::None => std::future::pending().await,
    }
}

fn connect(url: String) -> ConnectFuture {
    async move {
        connect_async(url)
            .await
            .map(|(ws, _response)| ws)
            .map_err(|e| StreamError::Connect(e.to_string()))
    }
    .boxed()
}

async fn next_tick(drain: &mut Option<Interval>) {
    match drain {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Coordinator {
    async fn run(mut self) {
        info!("Stream coordinator started ({})", self.config.url);

        // Streaming may already be on when the coordinator starts
        if *self.flag.borrow_and_update() {
            self.on_flag(true).await;
        }

        let shutdown_ack = loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::SendConfig(config)) => self.on_config(config).await,
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats);
                    }
                    Some(Command::Shutdown(reply)) => break Some(reply),
                    None => break None,
                },

                changed = self.flag.changed() => {
                    if changed.is_err() {
                        break None;
                    }
                    let enabled = *self.flag.borrow_and_update();
                    self.on_flag(enabled).await;
                }

                event = link_event(&mut self.link) => match event {
                    LinkEvent::Connected(result) => self.on_connect(result).await,
                    LinkEvent::Message(msg) => self.on_message(msg).await,
                },

                _ = next_tick(&mut self.drain) => self.on_drain_tick(),

                _ = deadline(self.close_deadline) => {
                    warn!("No 'confirmed closing' within {:?}, forcing close", self.config.close_timeout);
                    self.finish_close(false).await;
                }

                _ = deadline(self.session_deadline) => {
                    info!("Session limit reached, stopping stream");
                    self.session_deadline = None;
                    self.context.set_streaming(false);
                }
            }
        };

        self.teardown().await;
        if let Some(reply) = shutdown_ack {
            let _ = reply.send(());
        }
        info!("Stream coordinator stopped");
    }

    fn transition(&mut self, new_state: StreamState) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        debug!("Stream state {} -> {}", old_state, new_state);

        if new_state == StreamState::Idle {
            self.buffer.clear_pending();
        }

        self.state_tx.send_replace(new_state);
        self.event_bus
            .emit_lossy(MintEvent::stream_state_changed(old_state, new_state));
    }

    async fn on_flag(&mut self, enabled: bool) {
        if enabled {
            self.start_drain();
            if self.session_deadline.is_none() {
                self.session_deadline = self.config.session_limit.map(|limit| Instant::now() + limit);
            }
            match self.state {
                StreamState::Idle | StreamState::Closed => self.start_connect(),
                StreamState::ClosingGraceful => {
                    debug!("Streaming re-enabled while closing, reconnect deferred until closed");
                }
                StreamState::Connecting | StreamState::Open => {}
            }
            return;
        }

        self.drain = None;
        self.session_deadline = None;

        match self.state {
            StreamState::Connecting => {
                info!("Streaming disabled while connecting, abandoning connection attempt");
                self.link = Link::None;
                self.transition(StreamState::Idle);
            }
            StreamState::Open => self.begin_close().await,
            StreamState::ClosingGraceful | StreamState::Closed | StreamState::Idle => {}
        }
    }

    fn start_drain(&mut self) {
        if self.drain.is_some() {
            return;
        }
        let period = self.config.drain_interval.max(MIN_DRAIN_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.drain = Some(interval);
    }

    fn start_connect(&mut self) {
        info!("Opening stream connection to {}", self.config.url);
        self.link = Link::Connecting(connect(self.config.url.clone()));
        self.transition(StreamState::Connecting);
    }

    async fn on_connect(&mut self, result: Result<WsStream>) {
        match result {
            Ok(ws) => {
                info!("Stream connection opened");
                self.link = Link::Connected(ws);
                self.stats.connections_opened += 1;
                self.transition(StreamState::Open);

                if let Some(config) = self.pending_config.clone() {
                    self.send_config(&config).await;
                }
            }
            Err(e) => {
                error!("Stream to {}: {}", self.config.url, e);
                self.link = Link::None;
                self.transition(StreamState::Idle);
                self.context.set_streaming(false);
            }
        }
    }

    async fn on_config(&mut self, config: ProcessingConfig) {
        self.pending_config = Some(config.clone());
        if self.state == StreamState::Open {
            self.send_config(&config).await;
        } else {
            debug!("Processing config stored until the connection opens");
        }
    }

    async fn send_text(&mut self, message: ClientMessage) -> Result<()> {
        let text = message.to_text()?;
        let Link::Connected(ws) = &mut self.link else {
            return Err(StreamError::Send("no open connection".to_string()));
        };
        ws.send(Message::text(text))
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }

    async fn send_config(&mut self, config: &ProcessingConfig) {
        match self.send_text(ClientMessage::Configure(config.clone())).await {
            Ok(()) => {
                debug!("Processing config sent");
                self.event_bus.emit_lossy(MintEvent::ProcessingConfigSent {
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                error!("Failed to send processing config: {}", e);
                self.connection_lost().await;
            }
        }
    }

    async fn begin_close(&mut self) {
        info!("Initiating graceful close");
        if let Err(e) = self.send_text(ClientMessage::Closing).await {
            error!("Failed to send close request: {}", e);
            self.connection_lost().await;
            return;
        }
        self.close_deadline = Some(Instant::now() + self.config.close_timeout);
        self.transition(StreamState::ClosingGraceful);
    }

    async fn on_message(&mut self, msg: Option<std::result::Result<Message, tungstenite::Error>>) {
        match msg {
            Some(Ok(Message::Text(text))) => self.on_text(text.as_str()).await,
            Some(Ok(Message::Binary(data))) => {
                self.reject(format!("unexpected binary payload ({} bytes)", data.len()));
            }
            Some(Ok(Message::Close(frame))) => {
                info!("Peer closed the stream connection: {:?}", frame);
                if self.state == StreamState::ClosingGraceful {
                    self.finish_close(false).await;
                } else {
                    self.connection_lost().await;
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Stream connection error: {}", e);
                self.connection_lost().await;
            }
            None => {
                info!("Stream connection ended");
                self.connection_lost().await;
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::CloseAcknowledged) => {
                if self.state == StreamState::ClosingGraceful {
                    info!("Received 'confirmed closing', closing connection");
                    self.finish_close(true).await;
                } else {
                    debug!("Ignoring close acknowledgment in state {}", self.state);
                }
            }
            Ok(ServerMessage::Batch(batch)) => {
                self.stats.batches_received += 1;
                let added = self.buffer.push_batch(&batch);
                debug!(
                    "Buffered {} points ({} pending)",
                    added,
                    self.buffer.pending_len()
                );
            }
            Err(e) => self.reject(format!("malformed payload: {}", e)),
        }
    }

    fn reject(&mut self, reason: String) {
        warn!("Discarding inbound message: {}", reason);
        self.stats.batches_rejected += 1;
        self.event_bus.emit_lossy(MintEvent::BatchRejected {
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    fn on_drain_tick(&mut self) {
        let drained = self.buffer.drain_tick();
        if drained == 0 {
            return;
        }
        self.stats.points_drained += drained as u64;
        self.window_tx.send_replace(Arc::new(self.buffer.window()));
    }

    async fn close_socket(&mut self) {
        if let Link::Connected(mut ws) = std::mem::replace(&mut self.link, Link::None) {
            if let Err(e) = ws.close(None).await {
                debug!("Error while closing socket: {}", e);
            }
        }
    }

    /// End of the close handshake: acknowledged or forced
    async fn finish_close(&mut self, acknowledged: bool) {
        self.close_deadline = None;
        self.close_socket().await;
        self.transition(StreamState::Closed);
        self.event_bus.emit_lossy(MintEvent::StreamClosed {
            acknowledged,
            timestamp: chrono::Utc::now(),
        });
        self.transition(StreamState::Idle);

        if *self.flag.borrow() {
            info!("Streaming still enabled, opening a fresh connection");
            self.start_connect();
        }
    }

    /// Unexpected loss of the connection
    async fn connection_lost(&mut self) {
        self.close_deadline = None;
        self.close_socket().await;
        if self.state.holds_connection() {
            self.transition(StreamState::Closed);
        }
        self.transition(StreamState::Idle);
        self.context.set_streaming(false);
    }

    /// Final cleanup on shutdown; idempotent
    async fn teardown(&mut self) {
        self.drain = None;
        self.close_deadline = None;
        self.session_deadline = None;

        if self.state == StreamState::Open {
            if let Err(e) = self.send_text(ClientMessage::Closing).await {
                debug!("Close request on shutdown failed: {}", e);
            }
        }
        self.close_socket().await;
        if self.state.holds_connection() {
            self.transition(StreamState::Closed);
        }
        self.transition(StreamState::Idle);
    }
}
