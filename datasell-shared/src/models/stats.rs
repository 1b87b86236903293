use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Order, OrderStatus};

/// Dashboard counters derived from the order set.
///
/// Stores keep an incrementally maintained copy; [`AdminStats::recompute`]
/// is the authoritative fold and the two must always agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub pending_orders: u64,
    pub delivered_orders: u64,
}

impl AdminStats {
    pub fn recompute<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut stats = Self::default();
        for order in orders {
            stats.absorb(order);
        }
        stats
    }

    /// Count an order that is entering the store.
    pub fn absorb(&mut self, order: &Order) {
        self.total_orders += 1;
        self.credit(order.status, order.price);
    }

    /// Replace the contribution of `before` with that of `after`.
    ///
    /// Used on every update so that status transitions and price edits both
    /// keep the cache in line with [`AdminStats::recompute`].
    pub fn apply_update(&mut self, before: &Order, after: &Order) {
        if before.status == after.status && before.price == after.price {
            return;
        }
        self.retract(before.status, before.price);
        self.credit(after.status, after.price);
    }

    fn credit(&mut self, status: OrderStatus, price: Decimal) {
        match status {
            OrderStatus::PendingPayment => {}
            OrderStatus::Paid => {
                self.pending_orders += 1;
                self.total_revenue += price;
            }
            OrderStatus::Delivered => {
                self.delivered_orders += 1;
                self.total_revenue += price;
            }
            OrderStatus::Failed => {
                self.total_revenue += price;
            }
        }
    }

    // Counters clamp at zero so a stale cache can never go negative.
    fn retract(&mut self, status: OrderStatus, price: Decimal) {
        match status {
            OrderStatus::PendingPayment => {}
            OrderStatus::Paid => {
                self.pending_orders = self.pending_orders.saturating_sub(1);
                self.total_revenue = (self.total_revenue - price).max(Decimal::ZERO);
            }
            OrderStatus::Delivered => {
                self.delivered_orders = self.delivered_orders.saturating_sub(1);
                self.total_revenue = (self.total_revenue - price).max(Decimal::ZERO);
            }
            OrderStatus::Failed => {
                self.total_revenue = (self.total_revenue - price).max(Decimal::ZERO);
            }
        }
    }
}
