use async_trait::async_trait;
use datasell_catalog::PricingTable;
use datasell_shared::{AdminStats, Order, OrderDraft, OrderEvent, OrderPatch, OrderStatus};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The backend could not be reached. Tiered stores fall back on this.
    #[error("Store unreachable: {0}")]
    Transport(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Corrupt record: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Merge `patch` into `order` after checking the status transition.
///
/// Returns the order as it was before the merge, which backends feed into
/// [`AdminStats::apply_update`].
pub fn merge_patch(order: &mut Order, patch: OrderPatch) -> StoreResult<Order> {
    if let Some(next) = patch.status {
        if !order.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }
    }
    let before = order.clone();
    order.apply_patch(patch);
    Ok(before)
}

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new `pending_payment` order and count it in the stats.
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order>;

    /// Merge a patch into an existing order.
    ///
    /// Unknown ids yield [`StoreError::NotFound`]; status regressions yield
    /// [`StoreError::InvalidTransition`].
    async fn update(&self, id: &str, patch: OrderPatch) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Newest first, at most `limit` orders.
    async fn list_all(&self, limit: usize) -> StoreResult<Vec<Order>>;

    /// Newest first.
    async fn list_by_customer(&self, customer: &str) -> StoreResult<Vec<Order>>;

    async fn stats(&self) -> StoreResult<AdminStats>;

    /// Store a record under its own id unless that id already exists.
    /// Returns whether the record was written.
    async fn insert_existing(&self, order: Order) -> StoreResult<bool>;

    /// Recompute the stats from every stored order and replace the cached copy.
    async fn rebuild_stats(&self) -> StoreResult<AdminStats>;
}

/// Repository trait for the storefront price table
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// The stored table, or the defaults when nothing was saved yet.
    async fn get_prices(&self) -> StoreResult<PricingTable>;

    async fn save_prices(&self, prices: &PricingTable) -> StoreResult<()>;
}

pub type EventHandler = Arc<dyn Fn(OrderEvent) + Send + Sync>;

/// Push-style change feed
#[async_trait]
pub trait OrderFeed: Send + Sync {
    /// Invoke `handler` once per created/updated order, in arrival order.
    async fn subscribe(&self, handler: EventHandler) -> StoreResult<Subscription>;
}

/// Handle to a running feed listener. Dropping it stops the listener.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// One handle over several listeners. Dropping it stops all of them.
    pub fn combine(parts: Vec<Subscription>) -> Self {
        Self::new(tokio::spawn(async move {
            let _parts = parts;
            std::future::pending::<()>().await
        }))
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
