//! Notification sinks
//!
//! - [`TracingSink`]: structured log line per event
//! - [`ChannelSink`]: hands events to a consumer task over a bounded channel
//! - [`NullSink`]: discards events

use crate::api::{NotificationSink, TransitionEvent};
use crate::error::NotificationError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Logs each event at `info`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn emit(&self, event: TransitionEvent) -> Result<(), NotificationError> {
        tracing::info!(
            project_id = %event.project_id,
            from = %event.previous_state,
            to = %event.new_state,
            actor = %event.actor_id,
            "project status changed"
        );
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn emit(&self, _event: TransitionEvent) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Sends events into an mpsc channel
///
/// Uses `try_send`: a full or closed channel is a delivery failure, not a
/// reason to block the caller.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<TransitionEvent>,
}

impl ChannelSink {
    /// Create sink and its receiving end
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn emit(&self, event: TransitionEvent) -> Result<(), NotificationError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                NotificationError::Delivery("channel full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => NotificationError::Closed,
        })
    }
}
