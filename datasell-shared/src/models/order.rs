use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Delivered,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
        }
    }

    /// Delivered and failed orders never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Patches touching other fields may repeat a non-terminal status. A
    /// terminal status can't be written twice, so a second delivery write
    /// for the same order is rejected.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (OrderStatus::PendingPayment, OrderStatus::Paid)
                | (OrderStatus::Paid, OrderStatus::Delivered)
                | (OrderStatus::Paid, OrderStatus::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer's bundle purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer: String,
    pub customer_phone: String,
    pub plan: String,
    pub price: Decimal,
    pub status: OrderStatus,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_payment_method() -> String {
    "mobile_money".to_string()
}

fn default_network() -> String {
    "MTN".to_string()
}

impl Order {
    /// Materialize a draft into a fresh `pending_payment` order.
    pub fn from_draft(draft: OrderDraft) -> Self {
        let now = Utc::now();
        Self {
            id: generate_order_id(now),
            customer: draft.customer,
            customer_phone: draft.customer_phone,
            plan: draft.plan,
            price: draft.price,
            status: OrderStatus::PendingPayment,
            payment_method: draft.payment_method.unwrap_or_else(default_payment_method),
            network: draft.network.unwrap_or_else(default_network),
            transaction_id: None,
            failure_reason: None,
            paid_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Size label of the plan, i.e. the token before the first space.
    pub fn bundle_label(&self) -> &str {
        self.plan.split(' ').next().unwrap_or_default()
    }

    /// Merge a patch into this order.
    ///
    /// The caller is responsible for checking the status transition first.
    /// `id` and `created_at` are never touched.
    pub fn apply_patch(&mut self, patch: OrderPatch) {
        let now = Utc::now();

        if let Some(status) = patch.status {
            if status != self.status {
                match status {
                    OrderStatus::Paid => self.paid_at = Some(now),
                    OrderStatus::Delivered => self.delivered_at = Some(now),
                    _ => {}
                }
            }
            self.status = status;
        }
        if let Some(phone) = patch.customer_phone {
            self.customer_phone = phone;
        }
        if let Some(plan) = patch.plan {
            self.plan = plan;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if patch.transaction_id.is_some() {
            self.transaction_id = patch.transaction_id;
        }
        if patch.failure_reason.is_some() {
            self.failure_reason = patch.failure_reason;
        }

        self.updated_at = now;
    }
}

/// Format: DS-{unix_millis}-{short_uuid}
fn generate_order_id(now: DateTime<Utc>) -> String {
    let short_id = Uuid::new_v4().simple().to_string();
    format!("DS-{}-{}", now.timestamp_millis(), short_id[..8].to_uppercase())
}

/// What a customer submits when placing an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer: String,
    pub customer_phone: String,
    pub plan: String,
    pub price: Decimal,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

impl OrderDraft {
    pub fn new(customer: &str, customer_phone: &str, plan: &str, price: Decimal) -> Self {
        Self {
            customer: customer.to_string(),
            customer_phone: customer_phone.to_string(),
            plan: plan.to_string(),
            price,
            payment_method: None,
            network: None,
        }
    }
}

/// Partial update of an order. Identity and creation time are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn delivered(transaction_id: Option<String>) -> Self {
        Self {
            status: Some(OrderStatus::Delivered),
            transaction_id,
            ..Self::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(OrderStatus::Failed),
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}
