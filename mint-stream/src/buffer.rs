//! Accumulation buffer and render window
//!
//! Inbound batches arrive at arbitrary times; the render window advances only
//! on drain ticks. This decouples bursty network arrival from a steady
//! refresh rate.
//!
//! # Layout
//!
//! - `pending`: unbounded FIFO of normalized points not yet shown
//! - `window`: the newest `chart_size` points shown to the chart, oldest first

use mint_common::config::DrainPolicy;
use mint_common::{RawBatch, SignalPoint};
use std::collections::VecDeque;

/// Two-stage point buffer owned by the stream coordinator
///
/// # Examples
///
/// ```
/// use mint_common::RawBatch;
/// use mint_stream::StreamBuffer;
///
/// let mut buffer = StreamBuffer::new(2);
/// buffer.push_batch(&RawBatch {
///     timestamps: vec![0.0, 1.0, 2.0],
///     signals: vec![vec![5.0, 6.0, 7.0]],
/// });
///
/// assert_eq!(buffer.drain_tick(), 2);
/// assert_eq!(buffer.window_len(), 2);
/// assert_eq!(buffer.pending_len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    /// Accumulated points, oldest first
    pending: VecDeque<SignalPoint>,

    /// Points shown to the chart, never more than `chart_size`
    window: VecDeque<SignalPoint>,

    chart_size: usize,
    policy: DrainPolicy,
}

impl StreamBuffer {
    /// Create an empty buffer with the paced drain policy
    ///
    /// # Arguments
    ///
    /// * `chart_size` - Render window capacity in points
    pub fn new(chart_size: usize) -> Self {
        Self::with_policy(chart_size, DrainPolicy::Paced)
    }

    /// Create an empty buffer with an explicit drain policy
    ///
    /// # Arguments
    ///
    /// * `chart_size` - Render window capacity in points
    /// * `policy` - How many pending points one [`drain_tick`](Self::drain_tick) moves
    pub fn with_policy(chart_size: usize, policy: DrainPolicy) -> Self {
        Self {
            pending: VecDeque::new(),
            window: VecDeque::with_capacity(chart_size),
            chart_size,
            policy,
        }
    }

    /// Render window capacity
    pub fn chart_size(&self) -> usize {
        self.chart_size
    }

    /// Drain policy in force
    pub fn policy(&self) -> DrainPolicy {
        self.policy
    }

    /// Normalize a batch and append its points to the accumulation buffer
    ///
    /// # Returns
    ///
    /// Number of points appended
    pub fn push_batch(&mut self, batch: &RawBatch) -> usize {
        let points = batch.normalize();
        let count = points.len();
        self.pending.extend(points);
        count
    }

    /// Move accumulated points into the render window
    ///
    /// Takes the oldest pending points (at most `chart_size` under
    /// [`DrainPolicy::Paced`], all of them under [`DrainPolicy::Latest`]),
    /// appends them in order and evicts from the front until the window holds
    /// at most `chart_size` points. An empty accumulation buffer leaves the
    /// window untouched.
    ///
    /// # Returns
    ///
    /// Number of points taken from the accumulation buffer
    pub fn drain_tick(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let take = match self.policy {
            DrainPolicy::Paced => self.pending.len().min(self.chart_size),
            DrainPolicy::Latest => self.pending.len(),
        };

        self.window.extend(self.pending.drain(..take));
        let excess = self.window.len().saturating_sub(self.chart_size);
        self.window.drain(..excess);
        take
    }

    /// Current render window, oldest point first
    pub fn window(&self) -> Vec<SignalPoint> {
        self.window.iter().cloned().collect()
    }

    /// Points currently in the render window
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Points accumulated but not yet drained
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop points that were never shown
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}
