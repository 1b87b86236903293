use async_trait::async_trait;
use datasell_catalog::PricingTable;
use datasell_core::{
    merge_patch, EventHandler, OrderFeed, OrderRepository, PriceRepository, StoreError,
    StoreResult, Subscription,
};
use chrono::{DateTime, Utc};
use datasell_shared::{AdminStats, Order, OrderDraft, OrderEvent, OrderPatch};
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, RedisResult};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Optimistic write of one order document together with the stats document.
// Returns -1 if the order must be new but exists, 0 if either document
// changed since it was read, 1 once everything is written.
const WRITE_ORDER_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '' then
    if current then return -1 end
elseif current ~= ARGV[1] then
    return 0
end
local stats = redis.call('GET', KEYS[2])
if (stats or '') ~= ARGV[3] then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[4])
redis.call('ZADD', KEYS[3], ARGV[5], ARGV[6])
redis.call('ZADD', KEYS[4], ARGV[5], ARGV[6])
return 1
"#;

const MAX_WRITE_ATTEMPTS: usize = 8;

const RESUBSCRIBE_MIN_DELAY: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(30);
/// Replays reach back this far before the drop to cover clock skew between
/// writers.
const REPLAY_MARGIN: chrono::Duration = chrono::Duration::seconds(5);

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(RESUBSCRIBE_MAX_DELAY)
}

/// Unreachable servers become [`StoreError::Transport`] so a tiered store
/// can fall back; anything else is a storage failure.
fn map_redis_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StoreError::Transport(err.to_string())
    } else {
        StoreError::Storage(err.to_string())
    }
}

/// Key layout under one namespace.
#[derive(Debug, Clone)]
struct Keys {
    namespace: String,
}

impl Keys {
    fn order(&self, id: &str) -> String {
        format!("{}:order:{}", self.namespace, id)
    }

    fn all_orders(&self) -> String {
        format!("{}:orders", self.namespace)
    }

    fn customer(&self, customer: &str) -> String {
        format!("{}:customer:{}", self.namespace, customer)
    }

    fn stats(&self) -> String {
        format!("{}:stats", self.namespace)
    }

    fn prices(&self) -> String {
        format!("{}:prices", self.namespace)
    }

    fn events(&self) -> String {
        format!("{}:events", self.namespace)
    }
}

enum WriteOutcome {
    Written,
    Exists,
    Conflict,
}

/// Order store shared by every operator through a Redis server.
///
/// Orders are JSON documents indexed by creation time in sorted sets, one
/// for the whole store and one per customer. Changes are announced on a
/// pub/sub channel so that every connected process sees them.
pub struct RemoteOrderStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    keys: Keys,
    write_script: redis::Script,
}

impl RemoteOrderStore {
    /// Build a store for `url`. No connection is made until the first call.
    pub fn new(url: &str, namespace: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            keys: Keys {
                namespace: namespace.to_string(),
            },
            write_script: redis::Script::new(WRITE_ORDER_SCRIPT),
        })
    }

    /// Build a store and check that the server answers.
    pub async fn connect(url: &str, namespace: &str) -> StoreResult<Self> {
        let store = Self::new(url, namespace)?;
        store.connection().await?;
        info!(namespace, "Remote order store connected");
        Ok(store)
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let mut cached = self.conn.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Run a command result through the error mapping, dropping the cached
    /// connection when the server went away so the next call reconnects.
    async fn check<T>(&self, result: RedisResult<T>) -> StoreResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = map_redis_error(err);
                if err.is_transport() {
                    self.conn.lock().await.take();
                }
                Err(err)
            }
        }
    }

    async fn read_string(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.get(key).await;
        self.check(result).await
    }

    async fn write_order(
        &self,
        expected: Option<&str>,
        order: &Order,
        expected_stats: Option<&str>,
        stats: &AdminStats,
    ) -> StoreResult<WriteOutcome> {
        let body = serde_json::to_string(order)?;
        let stats_body = serde_json::to_string(stats)?;
        let mut conn = self.connection().await?;

        let result: RedisResult<i64> = self
            .write_script
            .key(self.keys.order(&order.id))
            .key(self.keys.stats())
            .key(self.keys.all_orders())
            .key(self.keys.customer(&order.customer))
            .arg(expected.unwrap_or_default())
            .arg(body)
            .arg(expected_stats.unwrap_or_default())
            .arg(stats_body)
            .arg(order.created_at.timestamp_millis())
            .arg(&order.id)
            .invoke_async(&mut conn)
            .await;

        Ok(match self.check(result).await? {
            1 => WriteOutcome::Written,
            -1 => WriteOutcome::Exists,
            _ => WriteOutcome::Conflict,
        })
    }

    fn decode_stats(raw: Option<&str>) -> StoreResult<AdminStats> {
        match raw {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(AdminStats::default()),
        }
    }

    /// Store a brand new order, counting it in the stats.
    async fn insert_new(&self, order: &Order) -> StoreResult<bool> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let raw_stats = self.read_string(&self.keys.stats()).await?;
            let mut stats = Self::decode_stats(raw_stats.as_deref())?;
            stats.absorb(order);

            match self.write_order(None, order, raw_stats.as_deref(), &stats).await? {
                WriteOutcome::Written => return Ok(true),
                WriteOutcome::Exists => return Ok(false),
                WriteOutcome::Conflict => debug!(order_id = %order.id, "Stats changed underneath, retrying"),
            }
        }
        Err(StoreError::Storage(format!(
            "Gave up writing order {} after {} attempts",
            order.id, MAX_WRITE_ATTEMPTS
        )))
    }

    async fn publish(&self, event: &OrderEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode order event");
                return;
            }
        };
        let channel = self.keys.events();
        let result = match self.connection().await {
            Ok(mut conn) => {
                let published: RedisResult<i64> = conn.publish(&channel, payload).await;
                published.map_err(map_redis_error)
            }
            Err(e) => Err(e),
        };
        // The write already happened; listeners can resync from the store.
        if let Err(e) = result {
            warn!(order_id = %event.order().id, error = %e, "Failed to publish order event");
        }
    }

    async fn load_orders(&self, ids: Vec<String>) -> StoreResult<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.keys.order(id)).collect();
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<Option<String>>> = conn.mget(keys).await;
        let bodies = self.check(result).await?;

        // Index entries without a document are skipped.
        bodies
            .into_iter()
            .flatten()
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .collect()
    }

    async fn newest_ids(&self, index: &str, limit: usize) -> StoreResult<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = isize::try_from(limit - 1).unwrap_or(-1);
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<String>> = conn.zrevrange(index, 0, stop).await;
        self.check(result).await
    }
}

#[async_trait]
impl OrderRepository for RemoteOrderStore {
    async fn create(&self, draft: OrderDraft) -> StoreResult<Order> {
        let order = Order::from_draft(draft);
        if !self.insert_new(&order).await? {
            return Err(StoreError::Storage(format!("Order id {} already taken", order.id)));
        }

        debug!(order_id = %order.id, "Order created");
        self.publish(&OrderEvent::Created(order.clone())).await;
        Ok(order)
    }

    async fn update(&self, id: &str, patch: OrderPatch) -> StoreResult<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let raw = self
                .read_string(&self.keys.order(id))
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let mut order: Order = serde_json::from_str(&raw)?;
            let before = merge_patch(&mut order, patch.clone())?;

            let raw_stats = self.read_string(&self.keys.stats()).await?;
            let mut stats = Self::decode_stats(raw_stats.as_deref())?;
            stats.apply_update(&before, &order);

            match self
                .write_order(Some(&raw), &order, raw_stats.as_deref(), &stats)
                .await?
            {
                WriteOutcome::Written => {
                    debug!(order_id = id, status = %order.status, "Order updated");
                    self.publish(&OrderEvent::Updated(order)).await;
                    return Ok(());
                }
                WriteOutcome::Exists | WriteOutcome::Conflict => {
                    debug!(order_id = id, "Concurrent write detected, retrying");
                }
            }
        }
        Err(StoreError::Storage(format!(
            "Gave up updating order {} after {} attempts",
            id, MAX_WRITE_ATTEMPTS
        )))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Order>> {
        match self.read_string(&self.keys.order(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let ids = self.newest_ids(&self.keys.all_orders(), limit).await?;
        self.load_orders(ids).await
    }

    async fn list_by_customer(&self, customer: &str) -> StoreResult<Vec<Order>> {
        let ids = self
            .newest_ids(&self.keys.customer(customer), usize::MAX)
            .await?;
        self.load_orders(ids).await
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let raw = self.read_string(&self.keys.stats()).await?;
        Self::decode_stats(raw.as_deref())
    }

    async fn insert_existing(&self, order: Order) -> StoreResult<bool> {
        self.insert_new(&order).await
    }

    async fn rebuild_stats(&self) -> StoreResult<AdminStats> {
        let orders = self.list_all(usize::MAX).await?;
        let stats = AdminStats::recompute(&orders);

        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn
            .set(self.keys.stats(), serde_json::to_string(&stats)?)
            .await;
        self.check(result).await?;

        info!(orders = orders.len(), "Rebuilt remote admin stats");
        Ok(stats)
    }
}

#[async_trait]
impl PriceRepository for RemoteOrderStore {
    async fn get_prices(&self) -> StoreResult<PricingTable> {
        match self.read_string(&self.keys.prices()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(PricingTable::default()),
        }
    }

    async fn save_prices(&self, prices: &PricingTable) -> StoreResult<()> {
        let raw = serde_json::to_string(prices)?;
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.set(self.keys.prices(), raw).await;
        self.check(result).await
    }
}

async fn open_pubsub(client: &redis::Client, channel: &str) -> RedisResult<PubSub> {
    // Pub/sub needs a dedicated connection.
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub)
}

/// Long-running pub/sub listener behind a [`Subscription`].
///
/// When the stream ends it resubscribes with exponential backoff. Messages
/// published while it was away are lost, so after every reconnect it replays
/// orders whose `updated_at` falls in the gap.
struct FeedListener {
    client: redis::Client,
    keys: Keys,
    handler: EventHandler,
}

impl FeedListener {
    async fn run(self, mut pubsub: Option<PubSub>, mut gap_since: Option<DateTime<Utc>>) {
        let channel = self.keys.events();
        let mut delay = RESUBSCRIBE_MIN_DELAY;
        loop {
            let current = match pubsub.take() {
                Some(current) => current,
                None => match open_pubsub(&self.client, &channel).await {
                    Ok(current) => {
                        info!(channel = %channel, "Resubscribed to order events");
                        current
                    }
                    Err(e) => {
                        warn!(
                            channel = %channel,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Order event stream unavailable"
                        );
                        tokio::time::sleep(delay).await;
                        delay = next_backoff(delay);
                        continue;
                    }
                },
            };
            delay = RESUBSCRIBE_MIN_DELAY;

            if let Some(since) = gap_since.take() {
                self.replay_since(since).await;
            }
            self.consume(current).await;

            warn!(channel = %channel, "Order event stream closed, resubscribing");
            gap_since = Some(Utc::now());
        }
    }

    async fn consume(&self, pubsub: PubSub) {
        let mut messages = pubsub.into_on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Unreadable order event payload");
                    continue;
                }
            };
            match serde_json::from_str::<OrderEvent>(&payload) {
                Ok(event) => (self.handler)(event),
                Err(e) => warn!(error = %e, "Ignoring malformed order event"),
            }
        }
    }

    async fn replay_since(&self, since: DateTime<Utc>) {
        match self.changed_since(since - REPLAY_MARGIN).await {
            Ok(orders) => {
                if !orders.is_empty() {
                    info!(orders = orders.len(), "Replaying order changes missed while disconnected");
                }
                for order in orders {
                    let event = if order.updated_at == order.created_at {
                        OrderEvent::Created(order)
                    } else {
                        OrderEvent::Updated(order)
                    };
                    (self.handler)(event);
                }
            }
            Err(e) => warn!(error = %e, "Failed to replay missed order changes"),
        }
    }

    /// Orders touched at or after `since`, oldest change first.
    async fn changed_since(&self, since: DateTime<Utc>) -> RedisResult<Vec<Order>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.keys.all_orders(), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.keys.order(id)).collect();
        let bodies: Vec<Option<String>> = conn.mget(keys).await?;

        let mut orders: Vec<Order> = bodies
            .into_iter()
            .flatten()
            .filter_map(|body| match serde_json::from_str::<Order>(&body) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable order during replay");
                    None
                }
            })
            .filter(|order| order.updated_at >= since)
            .collect();
        orders.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(orders)
    }
}

#[async_trait]
impl OrderFeed for RemoteOrderStore {
    /// Start listening. An unreachable server doesn't fail the call: the
    /// listener keeps retrying and replays what it missed once it gets in.
    async fn subscribe(&self, handler: EventHandler) -> StoreResult<Subscription> {
        let channel = self.keys.events();
        let (pubsub, gap_since) = match open_pubsub(&self.client, &channel).await {
            Ok(pubsub) => {
                debug!(channel = %channel, "Subscribed to order events");
                (Some(pubsub), None)
            }
            Err(e) => {
                warn!(channel = %channel, error = %map_redis_error(e), "Order event stream unavailable, retrying in the background");
                (None, Some(Utc::now()))
            }
        };

        let listener = FeedListener {
            client: self.client.clone(),
            keys: self.keys.clone(),
            handler,
        };
        Ok(Subscription::new(tokio::spawn(listener.run(pubsub, gap_since))))
    }
}
