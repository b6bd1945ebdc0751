//! Typed progress-event channel.
//!
//! Executors emit into a `ProgressBus`; the host subscribes and drains.
//! Modeling this as an explicit channel (rather than a bare callback) makes
//! multiple subscribers and mid-flight subscriber replacement well-defined:
//! a dropped receiver is pruned on the next emit, and new subscribers only
//! see events emitted after they subscribed.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::ProgressEvent;

#[derive(Clone, Default)]
pub struct ProgressBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The receiver sees every event emitted from
    /// this point on; dropping it unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to all live subscribers, pruning dead ones.
    pub fn emit(&self, event: ProgressEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
