use async_trait::async_trait;
use datasell_catalog::PricingTable;
use datasell_core::{
    EventHandler, OrderFeed, OrderRepository, PriceRepository, StoreError, StoreResult,
    Subscription,
};
use datasell_shared::{AdminStats, Order, OrderDraft, OrderPatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a store backend offers.
pub trait StoreBackend: OrderRepository + PriceRepository + OrderFeed {}

impl<T: OrderRepository + PriceRepository + OrderFeed> StoreBackend for T {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub copied: usize,
    pub skipped: usize,
}

/// Remote-first store that keeps working on the local store when the remote
/// one cannot be reached.
///
/// Only [`StoreError::Transport`] triggers the fallback, and only for the
/// operation that hit it. Every other error is returned as is.
pub struct TieredOrderStore {
    primary: Arc<dyn StoreBackend>,
    fallback: Arc<dyn StoreBackend>,
}

fn degrade(operation: &str, err: &StoreError) {
    warn!(operation, error = %err, "Remote store unreachable, persistence degraded to local store");
}

impl TieredOrderStore {
    pub fn new(primary: Arc<dyn StoreBackend>, fallback: Arc<dyn StoreBackend>) -> Self {
        Self { primary, fallback }
    }

    /// Copy every local order into the primary store, keeping any order the
    /// primary already has under the same id.
    pub async fn migrate_local(&self) -> StoreResult<MigrationReport> {
        let orders = self.fallback.list_all(usize::MAX).await?;
        let mut report = MigrationReport::default();

        for order in orders {
            let id = order.id.clone();
            if self.primary.insert_existing(order).await? {
                report.copied += 1;
            } else {
                info!(order_id = %id, "Order already present remotely, skipping");
                report.skipped += 1;
            }
        }

        info!(copied = report.copied, skipped = report.skipped, "Local orders migrated");
        Ok(report)
    }
}

#[async_trait]
impl OrderRepository for TieredOrderStore {
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order> {
        match self.primary.create(draft.clone()).await {
            Err(e) if e.is_transport() => {
                degrade("create", &e);
                self.fallback.create(draft).await
            }
            other => other,
        }
    }

    async fn update(&self, id: &str, patch: OrderPatch) -> StoreResult<()> {
        match self.primary.update(id, patch.clone()).await {
            Err(e) if e.is_transport() => {
                degrade("update", &e);
                self.fallback.update(id, patch).await
            }
            other => other,
        }
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Order>> {
        match self.primary.get(id).await {
            Err(e) if e.is_transport() => {
                degrade("get", &e);
                self.fallback.get(id).await
            }
            other => other,
        }
    }

    async fn list_all(&self, limit: usize) -> StoreResult<Vec<Order>> {
        match self.primary.list_all(limit).await {
            Err(e) if e.is_transport() => {
                degrade("list_all", &e);
                self.fallback.list_all(limit).await
            }
            other => other,
        }
    }

    async fn list_by_customer(&self, customer: &str) -> StoreResult<Vec<Order>> {
        match self.primary.list_by_customer(customer).await {
            Err(e) if e.is_transport() => {
                degrade("list_by_customer", &e);
                self.fallback.list_by_customer(customer).await
            }
            other => other,
        }
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        match self.primary.stats().await {
            Err(e) if e.is_transport() => {
                degrade("stats", &e);
                self.fallback.stats().await
            }
            other => other,
        }
    }

    async fn insert_existing(&self, order: Order) -> StoreResult<bool> {
        match self.primary.insert_existing(order.clone()).await {
            Err(e) if e.is_transport() => {
                degrade("insert_existing", &e);
                self.fallback.insert_existing(order).await
            }
            other => other,
        }
    }

    async fn rebuild_stats(&self) -> StoreResult<AdminStats> {
        match self.primary.rebuild_stats().await {
            Err(e) if e.is_transport() => {
                degrade("rebuild_stats", &e);
                self.fallback.rebuild_stats().await
            }
            other => other,
        }
    }
}

#[async_trait]
impl PriceRepository for TieredOrderStore {
    async fn get_prices(&self) -> StoreResult<PricingTable> {
        match self.primary.get_prices().await {
            Err(e) if e.is_transport() => {
                degrade("get_prices", &e);
                self.fallback.get_prices().await
            }
            other => other,
        }
    }

    async fn save_prices(&self, prices: &PricingTable) -> StoreResult<()> {
        match self.primary.save_prices(prices).await {
            Err(e) if e.is_transport() => {
                degrade("save_prices", &e);
                self.fallback.save_prices(prices).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl OrderFeed for TieredOrderStore {
    /// Listen to both stores. Writes land in exactly one of them, so no
    /// event is seen twice, and writes made while degraded still reach the
    /// handler.
    async fn subscribe(&self, handler: EventHandler) -> StoreResult<Subscription> {
        let mut parts = Vec::with_capacity(2);
        match self.primary.subscribe(handler.clone()).await {
            Ok(subscription) => parts.push(subscription),
            Err(e) if e.is_transport() => degrade("subscribe", &e),
            Err(e) => return Err(e),
        }
        parts.push(self.fallback.subscribe(handler).await?);
        Ok(Subscription::combine(parts))
    }
}
