//! Event bus for pitwall using tokio::broadcast
//!
//! Publishes warmup progress and interactive load outcomes to whoever listens.

use crate::models::SessionKey;
use tokio::sync::broadcast;

/// Events emitted by the warmup and interactive paths
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    /// A warmup batch was submitted
    WarmupStarted { total: usize },
    /// One warmup task finished (successfully or not)
    WarmupProgress { completed: usize, total: usize },
    /// One warmup task failed
    WarmupTaskFailed { key: SessionKey, message: String },
    /// The warmup batch drained
    WarmupFinished { succeeded: usize, failed: usize },
    /// A session was loaded on request
    SessionLoaded(SessionKey),
    /// An interactive load failed
    SessionLoadFailed { key: SessionKey, message: String },
}

/// Event bus for broadcasting dashboard events
///
/// Uses tokio::broadcast for multi-consumer support.
pub struct EventBus {
    sender: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DashboardEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
