//! # Mint Common Library
//!
//! Shared code for the Mint pipeline crates:
//! - Error type
//! - Configuration loading (TOML bootstrap + defaults)
//! - Event types (MintEvent enum) and EventBus
//! - Wire protocol types for the signal stream

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::{ProcessingConfig, RawBatch, SignalPoint};
