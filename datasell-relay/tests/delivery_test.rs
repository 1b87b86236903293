use async_trait::async_trait;
use datasell_core::{ProviderTransport, TransactionRequest, TransportError};
use datasell_order::ProviderClient;
use datasell_relay::{deliver, start_delivery_worker, RelayState};
use datasell_shared::{Order, OrderDraft, OrderPatch, OrderStatus};
use datasell_store::{LocalOrderStore, RemoteOrderStore, TieredOrderStore};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct CannedProvider {
    reply: Result<Value, TransportError>,
    latency: Duration,
    requests: Mutex<Vec<TransactionRequest>>,
}

impl CannedProvider {
    fn new(reply: Result<Value, TransportError>) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: Result<Value, TransportError>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            latency,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<TransactionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderTransport for CannedProvider {
    async fn submit_transaction(&self, request: &TransactionRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.latency).await;
        self.reply.clone()
    }

    async fn fetch_balance(&self) -> Result<Value, TransportError> {
        Ok(json!({"balance": "100.00"}))
    }
}

async fn setup(reply: Result<Value, TransportError>) -> (TempDir, RelayState, Arc<CannedProvider>) {
    setup_with(CannedProvider::new(reply)).await
}

async fn setup_with(provider: Arc<CannedProvider>) -> (TempDir, RelayState, Arc<CannedProvider>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalOrderStore::open(dir.path().join("orders.db")).await.unwrap());
    let state = RelayState::new(store, Arc::new(ProviderClient::new(provider.clone())));
    (dir, state, provider)
}

async fn paid_order(state: &RelayState, plan: &str) -> Order {
    let order = state
        .store
        .create(OrderDraft::new("ama@example.com", "024 123 4567", plan, Decimal::new(570, 2)))
        .await
        .unwrap();
    state
        .store
        .update(&order.id, OrderPatch::status(OrderStatus::Paid))
        .await
        .unwrap();
    order
}

async fn wait_for_status(state: &RelayState, id: &str, status: OrderStatus) -> Order {
    for _ in 0..100 {
        let order = state.store.get(id).await.unwrap().unwrap();
        if order.status == status {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("order {id} never reached {status}");
}

#[tokio::test]
async fn test_successful_delivery_is_recorded() {
    let (_dir, state, provider) =
        setup(Ok(json!({"status": true, "code": "0000", "transaction_id": "TX77"}))).await;
    let order = paid_order(&state, "1GB MTN Non-Expiry Data").await;

    let outcome = deliver(&state, &order.id).await.unwrap().unwrap();
    assert!(outcome.success);

    let stored = state.store.get(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.transaction_id.as_deref(), Some("TX77"));

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].phone, "0241234567");
    assert_eq!(sent[0].volume, "1024");

    let stats = state.store.stats().await.unwrap();
    assert_eq!(stats.delivered_orders, 1);
    assert_eq!(stats.pending_orders, 0);
}

#[tokio::test]
async fn test_provider_refusal_marks_order_failed() {
    let (_dir, state, _provider) = setup(Ok(json!({"status": false, "code": "1003"}))).await;
    let order = paid_order(&state, "2GB MTN Non-Expiry Data").await;

    deliver(&state, &order.id).await.unwrap();

    let stored = state.store.get(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(
        stored.failure_reason.as_deref(),
        Some("Insufficient balance in your account")
    );
}

#[tokio::test]
async fn test_transport_failure_leaves_order_paid() {
    let (_dir, state, _provider) =
        setup(Err(TransportError::Network("connection reset".into()))).await;
    let order = paid_order(&state, "1GB MTN Non-Expiry Data").await;

    let outcome = deliver(&state, &order.id).await.unwrap().unwrap();
    assert!(!outcome.success);

    let stored = state.store.get(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_unpaid_and_unknown_orders_are_skipped() {
    let (_dir, state, provider) = setup(Ok(json!({"status": true, "code": "0000"}))).await;
    let pending = state
        .store
        .create(OrderDraft::new("ama@example.com", "0241234567", "1GB MTN", Decimal::new(570, 2)))
        .await
        .unwrap();

    assert!(deliver(&state, &pending.id).await.unwrap().is_none());
    assert!(deliver(&state, "DS-0-UNKNOWN").await.unwrap().is_none());
    assert!(provider.sent().is_empty());
}

#[tokio::test]
async fn test_worker_delivers_orders_as_they_are_paid() {
    let (_dir, state, provider) =
        setup(Ok(json!({"status": true, "code": "0000", "transaction_id": "TX1"}))).await;
    let worker = start_delivery_worker(state.clone()).await.unwrap();
    assert!(worker.is_running());

    let order = paid_order(&state, "5GB MTN Non-Expiry Data").await;

    let delivered = wait_for_status(&state, &order.id, OrderStatus::Delivered).await;
    assert_eq!(delivered.transaction_id.as_deref(), Some("TX1"));
    assert_eq!(provider.sent()[0].volume, "5120");

    worker.shutdown().await;
}

#[tokio::test]
async fn test_backlog_covers_only_paid_orders() {
    let (_dir, state, provider) = setup(Ok(json!({"status": true, "code": "0000"}))).await;
    let first = paid_order(&state, "1GB MTN").await;
    let second = paid_order(&state, "3GB MTN").await;
    state
        .store
        .create(OrderDraft::new("kojo@example.com", "0241234567", "1GB MTN", Decimal::new(570, 2)))
        .await
        .unwrap();

    let worker = start_delivery_worker(state.clone()).await.unwrap();
    assert_eq!(worker.enqueue_paid_backlog().await.unwrap(), 2);
    wait_for_status(&state, &first.id, OrderStatus::Delivered).await;
    wait_for_status(&state, &second.id, OrderStatus::Delivered).await;

    let sent: Vec<String> = provider.sent().into_iter().map(|r| r.reference).collect();
    assert_eq!(sent, vec![first.id.clone(), second.id.clone()]);
    assert_eq!(worker.enqueue_paid_backlog().await.unwrap(), 0);
    worker.shutdown().await;
}

#[tokio::test]
async fn test_order_paid_during_startup_is_delivered_once() {
    let provider = CannedProvider::slow(
        Ok(json!({"status": true, "code": "0000", "transaction_id": "TX9"})),
        Duration::from_millis(200),
    );
    let (_dir, state, provider) = setup_with(provider).await;

    // Same order as the relay's startup: listen, then sweep the backlog.
    let worker = start_delivery_worker(state.clone()).await.unwrap();
    let order = paid_order(&state, "1GB MTN Non-Expiry Data").await;
    worker.enqueue_paid_backlog().await.unwrap();

    wait_for_status(&state, &order.id, OrderStatus::Delivered).await;
    // Give a second delivery the chance to show up.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(provider.sent().len(), 1);

    let stats = state.store.stats().await.unwrap();
    assert_eq!(stats.delivered_orders, 1);
    worker.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_finishes_queued_deliveries() {
    let provider = CannedProvider::slow(
        Ok(json!({"status": true, "code": "0000"})),
        Duration::from_millis(50),
    );
    let (_dir, state, provider) = setup_with(provider).await;
    let first = paid_order(&state, "1GB MTN").await;
    let second = paid_order(&state, "2GB MTN").await;

    let worker = start_delivery_worker(state.clone()).await.unwrap();
    assert_eq!(worker.enqueue_paid_backlog().await.unwrap(), 2);
    worker.shutdown().await;

    assert_eq!(provider.sent().len(), 2);
    for id in [&first.id, &second.id] {
        let stored = state.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
    }
}

#[tokio::test]
async fn test_second_delivery_write_is_rejected() {
    let (_dir, state, _provider) = setup(Ok(json!({"status": true, "code": "0000"}))).await;
    let order = paid_order(&state, "1GB MTN").await;
    deliver(&state, &order.id).await.unwrap();

    let again = state.store.update(&order.id, OrderPatch::delivered(None)).await;
    assert!(again.is_err());
}

#[tokio::test]
async fn test_order_paid_while_remote_is_down_is_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalOrderStore::open(dir.path().join("orders.db")).await.unwrap());
    // Nothing listens on port 1.
    let remote = Arc::new(RemoteOrderStore::new("redis://127.0.0.1:1/", "relay-test").unwrap());
    let provider = CannedProvider::new(Ok(json!({"status": true, "code": "0000", "transaction_id": "TX5"})));
    let state = RelayState::new(
        Arc::new(TieredOrderStore::new(remote, local.clone())),
        Arc::new(ProviderClient::new(provider.clone())),
    );

    let worker = start_delivery_worker(state.clone()).await.unwrap();
    let order = paid_order(&state, "1GB MTN Non-Expiry Data").await;

    let delivered = wait_for_status(&state, &order.id, OrderStatus::Delivered).await;
    assert_eq!(delivered.transaction_id.as_deref(), Some("TX5"));
    assert_eq!(provider.sent().len(), 1);
    worker.shutdown().await;
}
