use datasell_core::{CoreResult, StoreResult, Subscription};
use datasell_order::DeliveryOutcome;
use datasell_shared::{Order, OrderEvent, OrderPatch, OrderStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::state::RelayState;

type QueuedIds = Arc<Mutex<HashSet<String>>>;

/// Ids waiting for delivery or being delivered right now.
///
/// An id sits in `queued` from the moment it is pushed until the worker task
/// has recorded its outcome, so the feed and the backlog pass can't hand the
/// same order to the provider twice.
#[derive(Clone)]
struct DeliveryQueue {
    sender: mpsc::UnboundedSender<String>,
    queued: QueuedIds,
}

impl DeliveryQueue {
    fn push(&self, order_id: &str) -> bool {
        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        if !queued.insert(order_id.to_string()) {
            debug!(order_id, "Order already queued for delivery");
            return false;
        }
        if self.sender.send(order_id.to_string()).is_err() {
            queued.remove(order_id);
            warn!(order_id, "Delivery queue closed, dropping paid order");
            return false;
        }
        true
    }
}

/// Feed listener plus the single task that delivers paid orders.
pub struct DeliveryWorker {
    state: RelayState,
    subscription: Subscription,
    queue: DeliveryQueue,
    task: JoinHandle<()>,
}

impl DeliveryWorker {
    pub fn is_running(&self) -> bool {
        self.subscription.is_active() && !self.task.is_finished()
    }

    /// Queue orders that were already paid when the relay started, oldest
    /// first. Returns how many were queued; orders the feed already queued
    /// are not counted again.
    pub async fn enqueue_paid_backlog(&self) -> CoreResult<usize> {
        let mut paid: Vec<Order> = self
            .state
            .store
            .list_all(usize::MAX)
            .await?
            .into_iter()
            .filter(|order| order.status == OrderStatus::Paid)
            .collect();
        paid.reverse();

        let queued = paid.iter().filter(|order| self.queue.push(&order.id)).count();
        if queued > 0 {
            info!(queued, "Queued paid backlog");
        }
        Ok(queued)
    }

    /// Stop listening and let queued orders finish.
    pub async fn shutdown(self) {
        let DeliveryWorker {
            subscription,
            queue,
            task,
            ..
        } = self;
        // The queue closes once the feed handler and our sender are gone.
        subscription.cancel();
        drop(queue);
        if let Err(e) = task.await {
            error!(error = %e, "Delivery worker ended abnormally");
        }
    }
}

/// Deliver every order that turns `paid` from now on.
///
/// Feed handlers run synchronously, so paid orders are queued and handled
/// one at a time on a separate task.
pub async fn start_delivery_worker(state: RelayState) -> StoreResult<DeliveryWorker> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
    let queue = DeliveryQueue {
        sender,
        queued: QueuedIds::default(),
    };

    let feed_queue = queue.clone();
    let subscription = state
        .store
        .subscribe(Arc::new(move |event: OrderEvent| {
            let order = event.into_order();
            if order.status == OrderStatus::Paid {
                feed_queue.push(&order.id);
            }
        }))
        .await?;

    let task_state = state.clone();
    let queued = queue.queued.clone();
    let task = tokio::spawn(async move {
        while let Some(order_id) = receiver.recv().await {
            if let Err(e) = deliver(&task_state, &order_id).await {
                error!(order_id = %order_id, error = %e, "Failed to record delivery outcome");
            }
            queued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&order_id);
        }
        info!("Delivery worker stopped");
    });

    info!("Delivery worker listening for paid orders");
    Ok(DeliveryWorker {
        state,
        subscription,
        queue,
        task,
    })
}

/// Deliver one order and record the outcome.
///
/// The order is re-read first, so a stale event for an order that already
/// moved on is ignored and `None` is returned. Transport failures leave the
/// order `paid`. Callers other than the worker must not run this for an
/// order the worker may also be handling.
pub async fn deliver(state: &RelayState, order_id: &str) -> CoreResult<Option<DeliveryOutcome>> {
    let Some(order) = state.store.get(order_id).await? else {
        warn!(order_id, "Paid order vanished before delivery");
        return Ok(None);
    };
    if order.status != OrderStatus::Paid {
        return Ok(None);
    }

    let outcome = state.processor.process(&order).await;
    match outcome.next_status() {
        Some(OrderStatus::Delivered) => {
            let transaction_id = outcome
                .receipt
                .as_ref()
                .and_then(|receipt| receipt.transaction_id.clone());
            state
                .store
                .update(&order.id, OrderPatch::delivered(transaction_id))
                .await?;
            info!(order_id = %order.id, "{}", outcome.message);
        }
        Some(_) => {
            let reason = outcome
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| outcome.message.clone());
            state
                .store
                .update(&order.id, OrderPatch::failed(reason))
                .await?;
            warn!(order_id = %order.id, "{}", outcome.message);
        }
        None => {
            warn!(order_id = %order.id, "{}; order stays paid for a manual retry", outcome.message);
        }
    }
    Ok(Some(outcome))
}
