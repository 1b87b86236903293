//! Behaviour every store backend must share. Each backend's tests run these
//! against a fresh, empty store.

use datasell_catalog::{BundleLabel, PricingTable};
use datasell_core::StoreError;
use datasell_shared::{AdminStats, Order, OrderDraft, OrderEvent, OrderPatch, OrderStatus};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::tiered::StoreBackend;

pub(crate) fn draft(customer: &str, plan: &str, cents: i64) -> OrderDraft {
    OrderDraft::new(customer, "0240000000", plan, Decimal::new(cents, 2))
}

pub(crate) async fn create_then_get(store: &dyn StoreBackend) {
    let order = store
        .create(draft("ama@example.com", "1GB MTN Non-Expiry Data", 570))
        .await
        .unwrap();

    assert!(order.id.starts_with("DS-"));
    assert_eq!(order.status, OrderStatus::PendingPayment);
    let fetched = store.get(&order.id).await.unwrap().unwrap();
    assert_eq!(fetched, order);
    assert!(store.get("DS-0-MISSING").await.unwrap().is_none());
}

pub(crate) async fn lifecycle_keeps_stats_in_line(store: &dyn StoreBackend) {
    let a = store.create(draft("ama@example.com", "1GB MTN", 570)).await.unwrap();
    let b = store.create(draft("kojo@example.com", "2GB MTN", 1070)).await.unwrap();
    store.create(draft("kojo@example.com", "5GB MTN", 2570)).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.pending_orders, 0);

    store.update(&a.id, OrderPatch::status(OrderStatus::Paid)).await.unwrap();
    store.update(&a.id, OrderPatch::delivered(Some("TX1".into()))).await.unwrap();
    store.update(&b.id, OrderPatch::status(OrderStatus::Paid)).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.pending_orders, 1);
    assert_eq!(stats.delivered_orders, 1);
    assert_eq!(stats.total_revenue, Decimal::new(570 + 1070, 2));

    let orders = store.list_all(100).await.unwrap();
    assert_eq!(stats, AdminStats::recompute(&orders));

    let delivered = store.get(&a.id).await.unwrap().unwrap();
    assert_eq!(delivered.transaction_id.as_deref(), Some("TX1"));
    assert!(delivered.paid_at.is_some());
    assert!(delivered.delivered_at.is_some());
    assert_eq!(delivered.created_at, a.created_at);
}

pub(crate) async fn update_unknown_id_creates_nothing(store: &dyn StoreBackend) {
    let err = store
        .update("DS-1-ABCDEF12", OrderPatch::status(OrderStatus::Paid))
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound("DS-1-ABCDEF12".into()));
    assert!(store.list_all(10).await.unwrap().is_empty());
    assert_eq!(store.stats().await.unwrap(), AdminStats::default());
}

pub(crate) async fn terminal_order_rejects_regression(store: &dyn StoreBackend) {
    let order = store.create(draft("ama@example.com", "1GB MTN", 570)).await.unwrap();
    store.update(&order.id, OrderPatch::status(OrderStatus::Paid)).await.unwrap();
    store.update(&order.id, OrderPatch::failed("Invalid phone number")).await.unwrap();

    let err = store
        .update(&order.id, OrderPatch::status(OrderStatus::Paid))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let err = store
        .update(&order.id, OrderPatch::failed("again"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let stored = store.get(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("Invalid phone number"));
    assert_eq!(store.stats().await.unwrap(), AdminStats::recompute(&[stored]));
}

pub(crate) async fn listing_is_newest_first_and_bounded(store: &dyn StoreBackend) {
    let mut ids = Vec::new();
    for cents in [570, 1070, 1570] {
        let order = store.create(draft("ama@example.com", "1GB MTN", cents)).await.unwrap();
        ids.push(order.id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    store.create(draft("esi@example.com", "1GB MTN", 570)).await.unwrap();

    let mine: Vec<String> = store
        .list_by_customer("ama@example.com")
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    ids.reverse();
    assert_eq!(mine, ids);

    let all = store.list_all(2).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].customer, "esi@example.com");
    assert!(store.list_all(0).await.unwrap().is_empty());
    assert!(store.list_by_customer("nobody@example.com").await.unwrap().is_empty());
}

pub(crate) async fn listing_ties_break_on_id(store: &dyn StoreBackend) {
    let first = Order::from_draft(draft("ama@example.com", "1GB MTN", 570));
    let mut second = Order::from_draft(draft("ama@example.com", "2GB MTN", 1070));
    second.created_at = first.created_at;
    second.updated_at = first.updated_at;

    store.insert_existing(first.clone()).await.unwrap();
    store.insert_existing(second.clone()).await.unwrap();

    let mut expected = vec![first.id, second.id];
    expected.sort();
    expected.reverse();
    let listed: Vec<String> = store.list_all(10).await.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(listed, expected);
}

pub(crate) async fn insert_existing_skips_known_ids(store: &dyn StoreBackend) {
    let mut order = Order::from_draft(draft("ama@example.com", "1GB MTN", 570));
    order.apply_patch(OrderPatch::status(OrderStatus::Paid));

    assert!(store.insert_existing(order.clone()).await.unwrap());
    assert!(!store.insert_existing(order.clone()).await.unwrap());

    assert_eq!(store.get(&order.id).await.unwrap().unwrap(), order);
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_orders, 1);
    assert_eq!(stats.pending_orders, 1);
    assert_eq!(stats.total_revenue, Decimal::new(570, 2));
    assert_eq!(store.list_by_customer("ama@example.com").await.unwrap().len(), 1);
}

/// Writers racing on the shared stats all get counted.
pub(crate) async fn concurrent_writes_are_all_counted(store: &dyn StoreBackend) {
    let customers: Vec<String> = (0..8).map(|i| format!("c{i}@example.com")).collect();
    let created = join_all(
        customers
            .iter()
            .map(|customer| store.create(draft(customer, "1GB MTN", 570))),
    )
    .await;
    let orders: Vec<Order> = created.into_iter().map(|r| r.unwrap()).collect();

    let paid = join_all(
        orders
            .iter()
            .map(|order| store.update(&order.id, OrderPatch::status(OrderStatus::Paid))),
    )
    .await;
    assert!(paid.iter().all(|r| r.is_ok()));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_orders, 8);
    assert_eq!(stats.pending_orders, 8);
    assert_eq!(stats.total_revenue, Decimal::new(570 * 8, 2));
    assert_eq!(stats, AdminStats::recompute(&store.list_all(100).await.unwrap()));
}

pub(crate) async fn prices_default_until_saved(store: &dyn StoreBackend) {
    assert_eq!(store.get_prices().await.unwrap(), PricingTable::default());

    let table = PricingTable::default().with_price(BundleLabel::Gb1, Decimal::new(600, 2));
    store.save_prices(&table).await.unwrap();

    let loaded = store.get_prices().await.unwrap();
    assert_eq!(loaded.price_of(BundleLabel::Gb1), Decimal::new(600, 2));
    assert_eq!(loaded.price_of(BundleLabel::Gb2), Decimal::new(1070, 2));
}

/// Wait for an event on `rx` that satisfies `wanted`, skipping the rest.
pub(crate) async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<OrderEvent>,
    wanted: impl Fn(&OrderEvent) -> bool,
) -> OrderEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("feed closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("no matching order event")
}

pub(crate) async fn feed_reports_creates_and_updates(store: &dyn StoreBackend) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = store
        .subscribe(Arc::new(move |event: OrderEvent| {
            let _ = tx.send(event);
        }))
        .await
        .unwrap();

    let order = store.create(draft("ama@example.com", "1GB MTN", 570)).await.unwrap();
    let created = next_event(&mut rx, |e| e.order().id == order.id).await;
    assert!(matches!(created, OrderEvent::Created(_)));

    store.update(&order.id, OrderPatch::status(OrderStatus::Paid)).await.unwrap();
    let updated = next_event(&mut rx, |e| e.order().id == order.id).await;
    assert!(matches!(updated, OrderEvent::Updated(ref o) if o.status == OrderStatus::Paid));

    assert!(subscription.is_active());
}
