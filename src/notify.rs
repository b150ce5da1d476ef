//! Coarse change notification.
//!
//! Every write to the message store broadcasts one [`ChangeEvent`] naming
//! the message and its parties. Events are invalidation signals, not state:
//! a consumer that receives one re-queries the folders it is showing rather
//! than patching anything in place. Missing an event (lag, or nobody
//! subscribed yet) therefore costs a refresh, never correctness.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::message::{MessageId, UserId};

/// What changed, and whose views may be stale because of it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub message_id: MessageId,
    /// Users whose folder views the write may have altered.
    pub parties: Vec<UserId>,
}

/// Broadcast fan-out of change events.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all future change events. Slow subscribers lag and lose
    /// the oldest buffered events first.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publishes to every current subscriber. An event with no subscribers
    /// is dropped.
    pub(crate) fn publish(&self, event: ChangeEvent) {
        tracing::trace!(message = %event.message_id, "publishing change event");
        let _ = self.tx.send(event);
    }
}
