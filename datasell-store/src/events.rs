use datasell_core::{EventHandler, Subscription};
use datasell_shared::OrderEvent;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// In-process order feed used by the local store.
///
/// Each subscriber gets its own unbounded queue, so a slow handler delays
/// its own events but never loses them.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<OrderEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: OrderEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        // Senders whose listener has stopped are dropped here.
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            debug!(order_id = %event.order().id, "No order feed subscribers");
        }
    }

    pub fn subscribe(&self, handler: EventHandler) -> Subscription {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                handler(event);
            }
        });
        Subscription::new(task)
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
