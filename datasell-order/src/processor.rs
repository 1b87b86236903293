use datasell_catalog::BundleLabel;
use datasell_core::normalize_phone;
use datasell_shared::{Order, OrderStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::provider::{DeliveryError, DeliveryReceipt, ProviderClient};

/// Result of one delivery attempt for an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub order_id: String,
    pub success: bool,
    pub message: String,
    pub receipt: Option<DeliveryReceipt>,
    pub error: Option<DeliveryError>,
}

impl DeliveryOutcome {
    fn delivered(order_id: &str, receipt: DeliveryReceipt) -> Self {
        let transaction = receipt.transaction_id.as_deref().unwrap_or("n/a");
        Self {
            order_id: order_id.to_string(),
            success: true,
            message: format!("Data delivered! Transaction: {}", transaction),
            receipt: Some(receipt),
            error: None,
        }
    }

    fn failed(order_id: &str, error: DeliveryError) -> Self {
        Self {
            order_id: order_id.to_string(),
            success: false,
            message: format!("Delivery failed: {}", error),
            receipt: None,
            error: Some(error),
        }
    }

    /// Status the caller should record for this attempt.
    ///
    /// Transport failures return `None`: the order stays `paid` so that the
    /// delivery can be retried by hand. An order that wasn't `paid` keeps
    /// whatever status it had.
    pub fn next_status(&self) -> Option<OrderStatus> {
        match &self.error {
            None if self.success => Some(OrderStatus::Delivered),
            Some(DeliveryError::Transport(_)) | Some(DeliveryError::NotReady { .. }) => None,
            Some(_) => Some(OrderStatus::Failed),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Turns paid orders into provider deliveries.
///
/// The processor never writes to a store; recording the outcome is up to the
/// caller so a delivery can be retried independently of persistence.
pub struct OrderProcessor {
    provider: Arc<ProviderClient>,
}

impl OrderProcessor {
    pub fn new(provider: Arc<ProviderClient>) -> Self {
        Self { provider }
    }

    pub async fn process(&self, order: &Order) -> DeliveryOutcome {
        if order.status != OrderStatus::Paid {
            warn!(order_id = %order.id, status = %order.status, "Refusing to deliver unpaid order");
            return DeliveryOutcome::failed(
                &order.id,
                DeliveryError::NotReady {
                    order_id: order.id.clone(),
                    status: order.status,
                },
            );
        }

        let bundle = order.bundle_label();
        info!(order_id = %order.id, bundle, "Processing paid order");

        match self
            .provider
            .place_order(&order.customer_phone, bundle, &order.id)
            .await
        {
            Ok(receipt) => DeliveryOutcome::delivered(&order.id, receipt),
            Err(error) => DeliveryOutcome::failed(&order.id, error),
        }
    }

    /// Check a phone number and bundle label, reporting every broken rule.
    pub fn validate(phone: &str, bundle_label: &str) -> ValidationResult {
        let mut errors = Vec::new();

        if normalize_phone(phone).is_err() {
            errors.push("Invalid MTN number format".to_string());
        }
        if bundle_label.parse::<BundleLabel>().is_err() {
            errors.push("Invalid data bundle selected".to_string());
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
