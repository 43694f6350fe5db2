//! # Mint Stream
//!
//! Client side of the signal stream:
//! - [`StreamBuffer`]: accumulation buffer and bounded render window
//! - [`StreamCoordinator`]: connection lifecycle and close handshake
//! - [`StreamingContext`]: shared "streaming enabled" flag
//! - [`PipelineSession`]: keeps the producer's processing config in step
//!   with the pipeline graph

pub mod buffer;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod session;

pub use buffer::StreamBuffer;
pub use context::StreamingContext;
pub use coordinator::{
    CoordinatorConfig, RenderWindow, StreamCoordinator, StreamHandle, StreamStats,
};
pub use error::{Result, StreamError};
pub use session::PipelineSession;
