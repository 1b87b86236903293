use async_trait::async_trait;
use datasell_catalog::PricingTable;
use datasell_core::{
    merge_patch, EventHandler, OrderFeed, OrderRepository, PriceRepository, StoreError,
    StoreResult, Subscription,
};
use datasell_shared::{AdminStats, Order, OrderDraft, OrderEvent, OrderPatch};
use sqlx::{Sqlite, SqliteConnection};
use std::path::Path;
use tracing::{debug, info};

use crate::database::DbClient;
use crate::events::EventBus;

const STATS_KEY: &str = "admin_stats";
const PRICES_KEY: &str = "prices";

fn storage_error(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

/// Order store backed by a SQLite file on the operator's machine.
///
/// Orders are kept as JSON documents next to their id, customer and creation
/// time; stats and prices live in the `kv` table. Every write that touches
/// the stats runs in one transaction with the order write.
pub struct LocalOrderStore {
    db: DbClient,
    events: EventBus,
}

impl LocalOrderStore {
    pub fn new(db: DbClient) -> Self {
        Self {
            db,
            events: EventBus::default(),
        }
    }

    /// Open the database at `path`, creating and migrating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = DbClient::connect(path).await.map_err(storage_error)?;
        db.migrate()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        info!(path = %path.display(), "Local order store ready");
        Ok(Self::new(db))
    }

    async fn read_doc(conn: &mut SqliteConnection, key: &str) -> StoreResult<Option<String>> {
        sqlx::query_scalar::<Sqlite, String>("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(conn)
            .await
            .map_err(storage_error)
    }

    async fn write_doc(conn: &mut SqliteConnection, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(conn)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn read_stats(conn: &mut SqliteConnection) -> StoreResult<AdminStats> {
        match Self::read_doc(conn, STATS_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(AdminStats::default()),
        }
    }

    async fn write_stats(conn: &mut SqliteConnection, stats: &AdminStats) -> StoreResult<()> {
        let raw = serde_json::to_string(stats)?;
        Self::write_doc(conn, STATS_KEY, &raw).await
    }

    /// Insert `order` unless its id exists. Returns whether a row was written.
    async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> StoreResult<bool> {
        let body = serde_json::to_string(order)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO orders (id, customer, created_at, body) VALUES (?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.customer)
        .bind(order.created_at.timestamp_millis())
        .bind(body)
        .execute(conn)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    fn decode_all(rows: Vec<String>) -> StoreResult<Vec<Order>> {
        rows.iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl OrderRepository for LocalOrderStore {
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order> {
        let order = Order::from_draft(draft);

        let mut tx = self.db.pool.begin().await.map_err(storage_error)?;
        if !Self::insert_order(&mut tx, &order).await? {
            return Err(StoreError::Storage(format!("Order id {} already taken", order.id)));
        }
        let mut stats = Self::read_stats(&mut tx).await?;
        stats.absorb(&order);
        Self::write_stats(&mut tx, &stats).await?;
        tx.commit().await.map_err(storage_error)?;

        debug!(order_id = %order.id, "Order created");
        self.events.publish(OrderEvent::Created(order.clone()));
        Ok(order)
    }

    async fn update(&self, id: &str, patch: OrderPatch) -> StoreResult<()> {
        let mut tx = self.db.pool.begin().await.map_err(storage_error)?;

        let body = sqlx::query_scalar::<Sqlite, String>("SELECT body FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut order: Order = serde_json::from_str(&body)?;
        let before = merge_patch(&mut order, patch)?;

        sqlx::query("UPDATE orders SET body = ? WHERE id = ?")
            .bind(serde_json::to_string(&order)?)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let mut stats = Self::read_stats(&mut tx).await?;
        stats.apply_update(&before, &order);
        Self::write_stats(&mut tx, &stats).await?;
        tx.commit().await.map_err(storage_error)?;

        debug!(order_id = id, status = %order.status, "Order updated");
        self.events.publish(OrderEvent::Updated(order));
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Order>> {
        let body = sqlx::query_scalar::<Sqlite, String>("SELECT body FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await
            .map_err(storage_error)?;
        match body {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_scalar::<Sqlite, String>(
            "SELECT body FROM orders ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.db.pool)
        .await
        .map_err(storage_error)?;
        Self::decode_all(rows)
    }

    async fn list_by_customer(&self, customer: &str) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_scalar::<Sqlite, String>(
            "SELECT body FROM orders WHERE customer = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(customer)
        .fetch_all(&self.db.pool)
        .await
        .map_err(storage_error)?;
        Self::decode_all(rows)
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let mut conn = self.db.pool.acquire().await.map_err(storage_error)?;
        Self::read_stats(&mut conn).await
    }

    async fn insert_existing(&self, order: Order) -> StoreResult<bool> {
        let mut tx = self.db.pool.begin().await.map_err(storage_error)?;
        let written = Self::insert_order(&mut tx, &order).await?;
        if written {
            let mut stats = Self::read_stats(&mut tx).await?;
            stats.absorb(&order);
            Self::write_stats(&mut tx, &stats).await?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(written)
    }

    async fn rebuild_stats(&self) -> StoreResult<AdminStats> {
        let mut tx = self.db.pool.begin().await.map_err(storage_error)?;
        let rows = sqlx::query_scalar::<Sqlite, String>("SELECT body FROM orders")
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_error)?;
        let orders = Self::decode_all(rows)?;
        let stats = AdminStats::recompute(&orders);
        Self::write_stats(&mut tx, &stats).await?;
        tx.commit().await.map_err(storage_error)?;

        info!(orders = orders.len(), "Rebuilt local admin stats");
        Ok(stats)
    }
}

#[async_trait]
impl PriceRepository for LocalOrderStore {
    async fn get_prices(&self) -> StoreResult<PricingTable> {
        let mut conn = self.db.pool.acquire().await.map_err(storage_error)?;
        match Self::read_doc(&mut conn, PRICES_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(PricingTable::default()),
        }
    }

    async fn save_prices(&self, prices: &PricingTable) -> StoreResult<()> {
        let raw = serde_json::to_string(prices)?;
        let mut conn = self.db.pool.acquire().await.map_err(storage_error)?;
        Self::write_doc(&mut conn, PRICES_KEY, &raw).await
    }
}

#[async_trait]
impl OrderFeed for LocalOrderStore {
    async fn subscribe(&self, handler: EventHandler) -> StoreResult<Subscription> {
        Ok(self.events.subscribe(handler))
    }
}
