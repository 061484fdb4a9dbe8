//! Typed publish/subscribe transport.
//!
//! Each subscriber owns an unbounded `mpsc` channel. Publishing never
//! waits and never drops: a slow subscriber only grows its own queue, and
//! a subscriber whose receiver was dropped is pruned on the next publish.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Cloneable handle to a shared set of subscribers.
pub struct EventBus<T> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a new subscriber. Only events published afterwards are delivered.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber without waiting.
    pub fn publish(&self, event: T) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() < before {
            tracing::debug!(
                pruned = before - subscribers.len(),
                "dropped closed event subscribers"
            );
        }
    }

    /// Number of registered subscribers (closed ones are pruned lazily).
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
