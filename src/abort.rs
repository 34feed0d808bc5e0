//! Cooperative cancellation for one connection.
//!
//! Each connection owns one [`AbortFlag`]. An ABORT arriving on another connection sets it;
//! the running handler polls it at checkpoints between sub-steps. Once set it stays set.

use std::sync::Arc;
use tokio::sync::watch;

/// Set-once abort signal shared by a connection and anyone who may abort it.
#[derive(Debug, Clone)]
pub struct AbortFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortFlag {
    /// A flag that has not been requested.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests an abort. Idempotent.
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`AbortFlag::request`] has been called on any clone.
    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once an abort has been requested.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
