//! # Mint Simulator
//!
//! Synthetic headset server: streams random multi-channel batches over
//! WebSocket, applies the client's band-pass and downsampling settings, and
//! implements the server half of the close handshake.

pub mod filter;
pub mod generator;
pub mod server;

pub use filter::BandpassFilter;
pub use generator::SignalGenerator;
pub use server::{build_router, AppState, HealthResponse};
