//! Wire protocol for the signal stream
//!
//! Plain text over a persistent WebSocket, one message per frame:
//!
//! - server → client: a JSON batch `{ "timestamps": [...], "signals": [[...], ...] }`
//!   or the literal `confirmed closing`
//! - client → server: the literal `clientClosing` or a JSON [`ProcessingConfig`]
//!
//! No versioning, no framing beyond one message per batch, no authentication.

use crate::{Error, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Client request to begin the close handshake
pub const CLIENT_CLOSING: &str = "clientClosing";

/// Server acknowledgment of [`CLIENT_CLOSING`]
pub const CONFIRMED_CLOSING: &str = "confirmed closing";

/// Filter parameters forwarded to the stream producer.
///
/// The client never interprets these values, it only sends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub apply_bandpass: bool,
    pub use_iir: bool,
    pub l_freq: Option<f64>,
    pub h_freq: Option<f64>,
    pub downsample_factor: Option<u32>,
    pub sfreq: f64,
    pub n_channels: u32,
}

impl ProcessingConfig {
    /// Configuration that asks for no filtering at all
    pub fn passthrough(sfreq: f64, n_channels: u32) -> Self {
        Self {
            apply_bandpass: false,
            use_iir: false,
            l_freq: None,
            h_freq: None,
            downsample_factor: None,
            sfreq,
            n_channels,
        }
    }
}

/// One batch as it arrives on the wire: `signals[channel][index]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    pub timestamps: Vec<f64>,
    pub signals: Vec<Vec<f64>>,
}

impl RawBatch {
    /// Number of channels in this batch
    pub fn channel_count(&self) -> usize {
        self.signals.len()
    }

    /// Convert channel-major samples into one point per timestamp.
    ///
    /// A channel row shorter than `timestamps` yields `None` for the missing
    /// indices.
    pub fn normalize(&self) -> Vec<SignalPoint> {
        self.timestamps
            .iter()
            .enumerate()
            .map(|(i, &time)| SignalPoint {
                time,
                signals: self
                    .signals
                    .iter()
                    .map(|channel| channel.get(i).copied())
                    .collect(),
            })
            .collect()
    }
}

/// Normalized sample record, one per timestamp.
///
/// Serializes as `{ "time": t, "signal1": v1, "signal2": v2, ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPoint {
    pub time: f64,
    pub signals: Vec<Option<f64>>,
}

impl SignalPoint {
    pub fn new(time: f64, signals: Vec<Option<f64>>) -> Self {
        Self { time, signals }
    }

    /// Value of channel `n` using 1-based numbering (`signal1` is channel 1)
    pub fn signal(&self, n: usize) -> Option<f64> {
        n.checked_sub(1)
            .and_then(|idx| self.signals.get(idx).copied().flatten())
    }
}

impl Serialize for SignalPoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.signals.len() + 1))?;
        map.serialize_entry("time", &self.time)?;
        for (idx, value) in self.signals.iter().enumerate() {
            map.serialize_entry(&format!("signal{}", idx + 1), value)?;
        }
        map.end()
    }
}

/// Messages sent by the stream producer
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    CloseAcknowledged,
    Batch(RawBatch),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self> {
        if text == CONFIRMED_CLOSING {
            return Ok(ServerMessage::CloseAcknowledged);
        }
        let batch: RawBatch = serde_json::from_str(text)?;
        Ok(ServerMessage::Batch(batch))
    }

    pub fn to_text(&self) -> Result<String> {
        match self {
            ServerMessage::CloseAcknowledged => Ok(CONFIRMED_CLOSING.to_string()),
            ServerMessage::Batch(batch) => Ok(serde_json::to_string(batch)?),
        }
    }
}

/// Messages sent by the streaming client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Closing,
    Configure(ProcessingConfig),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        if text == CLIENT_CLOSING {
            return Ok(ClientMessage::Closing);
        }
        serde_json::from_str(text)
            .map(ClientMessage::Configure)
            .map_err(|e| Error::Protocol(format!("unrecognized client message: {}", e)))
    }

    pub fn to_text(&self) -> Result<String> {
        match self {
            ClientMessage::Closing => Ok(CLIENT_CLOSING.to_string()),
            ClientMessage::Configure(config) => Ok(serde_json::to_string(config)?),
        }
    }
}
