//! Streaming flag shared between the session, the coordinator and observers

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared "streaming enabled" flag
///
/// Cloning yields another handle to the same flag.
#[derive(Clone)]
pub struct StreamingContext {
    tx: Arc<watch::Sender<bool>>,
}

impl StreamingContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag; returns true if the value changed
    pub fn set_streaming(&self, enabled: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == enabled {
                false
            } else {
                *current = enabled;
                true
            }
        });
        if changed {
            info!("Data streaming {}", if enabled { "enabled" } else { "disabled" });
        }
        changed
    }

    pub fn is_streaming(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for StreamingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_streaming_reports_changes_only() {
        let ctx = StreamingContext::new();
        assert!(!ctx.is_streaming());
        assert!(ctx.set_streaming(true));
        assert!(!ctx.set_streaming(true));
        assert!(ctx.is_streaming());
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let ctx = StreamingContext::new();
        let mut rx = ctx.subscribe();
        let other = ctx.clone();

        other.set_streaming(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
