use chrono::{DateTime, Utc};
use datasell_catalog::PricingTable;
use datasell_core::StoreResult;
use datasell_shared::{AdminStats, Order};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::tiered::StoreBackend;

/// Point-in-time dump of a store, newest order first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub orders: Vec<Order>,
    pub prices: PricingTable,
    pub stats: AdminStats,
    pub exported_at: DateTime<Utc>,
}

pub async fn export_snapshot(store: &dyn StoreBackend) -> StoreResult<StoreSnapshot> {
    let orders = store.list_all(usize::MAX).await?;
    let prices = store.get_prices().await?;
    let stats = store.stats().await?;

    info!(orders = orders.len(), "Exported store snapshot");
    Ok(StoreSnapshot {
        orders,
        prices,
        stats,
        exported_at: Utc::now(),
    })
}
