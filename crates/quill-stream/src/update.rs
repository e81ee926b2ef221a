//! Subscriber fan-out
//!
//! State changes are published on a broadcast channel instead of through
//! registered callbacks: dropping the receiver unsubscribes, and a slow
//! or broken subscriber can lag but never block the manager or other
//! subscribers.

use tokio::sync::broadcast;

use crate::state::StreamState;

/// One published state change
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub conversation_id: String,
    /// The full new state, or `None` when the entry was cleared
    pub state: Option<StreamState>,
}

/// A subscription to all stream state changes.
///
/// Dropping this value unsubscribes.
pub struct StreamUpdates {
    rx: broadcast::Receiver<StreamUpdate>,
}

impl StreamUpdates {
    pub(crate) fn new(rx: broadcast::Receiver<StreamUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next update; `None` once the manager is gone.
    ///
    /// A lagged subscriber skips the updates it missed and keeps going;
    /// the next received update carries the full current state anyway.
    pub async fn next(&mut self) -> Option<StreamUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("subscriber lagged, skipped {skipped} updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
