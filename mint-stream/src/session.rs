//! Pipeline session
//!
//! Ties one graph to one stream coordinator. Whenever the graph changes (or
//! the poll interval elapses) the processing config is recomputed from the
//! contributing filter and handed to the coordinator if it differs from the
//! last one. The coordinator decides whether to transmit it now or on open.

use crate::context::StreamingContext;
use crate::coordinator::{CoordinatorConfig, StreamCoordinator, StreamHandle};
use mint_common::config::{ProcessingDefaults, TomlConfig};
use mint_common::ProcessingConfig;
use mint_graph::{ActivationMonitor, SharedGraph, StatusMap, POLL_INTERVAL};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct PipelineSession {
    graph: SharedGraph,
    context: StreamingContext,
    stream: StreamHandle,
    monitor: ActivationMonitor,
    forwarder: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl PipelineSession {
    /// Start a session with settings from the TOML config
    pub fn from_config(graph: SharedGraph, config: &TomlConfig) -> Self {
        Self::start(
            graph,
            CoordinatorConfig::from(&config.stream),
            config.processing.clone(),
        )
    }

    /// Spawn the coordinator, the activation monitor and the config forwarder
    ///
    /// # Arguments
    ///
    /// * `graph` - Pipeline whose processing config is sent to the producer
    /// * `coordinator` - Stream connection settings
    /// * `defaults` - `sfreq`/`n_channels` placed in every processing config
    pub fn start(
        graph: SharedGraph,
        coordinator: CoordinatorConfig,
        defaults: ProcessingDefaults,
    ) -> Self {
        let context = StreamingContext::new();
        let stream = StreamCoordinator::spawn(
            coordinator,
            context.clone(),
            graph.event_bus().clone(),
        );
        let monitor = ActivationMonitor::start(graph.clone(), context.subscribe());
        let shutdown = Arc::new(Notify::new());

        let forwarder = tokio::spawn(forward_configs(
            graph.clone(),
            stream.clone(),
            defaults,
            Arc::clone(&shutdown),
        ));

        info!("Pipeline session started");
        Self {
            graph,
            context,
            stream,
            monitor,
            forwarder,
            shutdown,
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn context(&self) -> &StreamingContext {
        &self.context
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn set_streaming(&self, enabled: bool) {
        self.context.set_streaming(enabled);
    }

    /// Node statuses kept current by the activation monitor
    pub fn statuses(&self) -> watch::Receiver<StatusMap> {
        self.monitor.subscribe()
    }

    /// Stop forwarding, close the stream and stop the monitor
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.forwarder.await {
            warn!("Config forwarder task failed: {}", e);
        }
        self.stream.shutdown().await;
        self.monitor.shutdown().await;
        info!("Pipeline session stopped");
    }
}

async fn forward_configs(
    graph: SharedGraph,
    stream: StreamHandle,
    defaults: ProcessingDefaults,
    shutdown: Arc<Notify>,
) {
    let mut events = graph.event_bus().subscribe();
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sent: Option<ProcessingConfig> = None;

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,

            event = events.recv() => match event {
                Ok(event) if event.is_graph_event() => {}
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    debug!("Config forwarder lagged {} events", n);
                }
                Err(RecvError::Closed) => break,
            },

            _ = poll.tick() => {}
        }

        let config = graph.read().await.processing_config(&defaults);
        if last_sent.as_ref() == Some(&config) {
            continue;
        }

        debug!(
            "Processing config changed (bandpass={}, l_freq={:?}, h_freq={:?})",
            config.apply_bandpass, config.l_freq, config.h_freq
        );
        if stream.send_processing_config(config.clone()).await.is_err() {
            warn!("Stream coordinator stopped, config forwarding ends");
            break;
        }
        last_sent = Some(config);
    }
}
