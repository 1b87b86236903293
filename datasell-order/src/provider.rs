use datasell_catalog::volume_for_bundle;
use datasell_core::{normalize_phone, ProviderTransport, TransactionRequest, TransportError};
use datasell_shared::{Masked, OrderStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Code the provider returns alongside `status: true` for a completed delivery.
const SUCCESS_CODE: &str = "0000";
const GENERIC_FAILURE: &str = "Delivery failed - please try again";
const DEFAULT_CURRENCY: &str = "GHS";

/// Human-readable text for the provider's documented failure codes.
fn known_error_message(code: &str) -> Option<&'static str> {
    match code {
        "1001" => Some("Invalid network selected"),
        "1002" => Some("Invalid data bundle size"),
        "1003" => Some("Insufficient balance in your account"),
        "1004" => Some("Invalid phone number format"),
        "1005" => Some("Transaction failed - please try again"),
        "9999" => Some("Temporary service issue - please try again in 2 minutes"),
        _ => None,
    }
}

/// Proof of a completed delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub transaction_id: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Rejected locally; the provider was never called.
    #[error("{0}")]
    Validation(String),

    /// The order isn't `paid`, so there is nothing to deliver yet.
    #[error("Order {order_id} is not ready for delivery (status: {status})")]
    NotReady { order_id: String, status: OrderStatus },

    /// The exchange itself failed. Safe to retry by hand once the provider
    /// side has been checked.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The provider answered but refused the delivery.
    #[error("{message}")]
    Provider {
        code: Option<String>,
        message: String,
    },
}

/// Advisory wallet balance. Never an error: failures report zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceResult {
    pub success: bool,
    pub available_balance: Decimal,
    pub currency: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
    pub balance: Option<Decimal>,
}

/// Places where the balance has been observed in provider responses,
/// tried in order.
#[derive(Debug, Clone, Copy)]
enum BalanceProbe {
    Field(&'static str),
    Nested(&'static str, &'static str),
    /// Any top-level key whose name contains "balance".
    AnyField,
    /// Any key containing "balance" inside a top-level object.
    AnyNestedField,
}

const BALANCE_PROBES: [BalanceProbe; 6] = [
    BalanceProbe::Nested("data", "wallet_balance"),
    BalanceProbe::Field("balance"),
    BalanceProbe::Field("available_balance"),
    BalanceProbe::Nested("data", "balance"),
    BalanceProbe::AnyField,
    BalanceProbe::AnyNestedField,
];

impl BalanceProbe {
    fn extract(&self, body: &Value) -> Option<Decimal> {
        match self {
            BalanceProbe::Field(key) => body.get(*key).and_then(as_decimal),
            BalanceProbe::Nested(outer, key) => {
                body.get(*outer).and_then(|v| v.get(*key)).and_then(as_decimal)
            }
            BalanceProbe::AnyField => body.as_object().and_then(scan_balance_keys),
            BalanceProbe::AnyNestedField => body.as_object().and_then(|fields| {
                fields
                    .values()
                    .filter_map(Value::as_object)
                    .find_map(scan_balance_keys)
            }),
        }
    }
}

fn scan_balance_keys(fields: &Map<String, Value>) -> Option<Decimal> {
    fields
        .iter()
        .filter(|(key, _)| key.to_ascii_lowercase().contains("balance"))
        .find_map(|(_, value)| as_decimal(value))
}

/// Numbers and numeric strings both count.
fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Provider codes arrive as strings or bare numbers; numbers are padded back
/// to the four-digit form.
fn as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => n.as_u64().map(|c| format!("{:04}", c)),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Client for the data-delivery provider's transaction API.
///
/// Holds no state besides the transport, so one instance can be shared by
/// every processor.
pub struct ProviderClient {
    transport: Arc<dyn ProviderTransport>,
    currency: String,
}

impl ProviderClient {
    pub fn new(transport: Arc<dyn ProviderTransport>) -> Self {
        Self {
            transport,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn volume_for_bundle(&self, label: &str) -> u32 {
        volume_for_bundle(label)
    }

    /// Send one delivery request for `bundle_label` to `phone`.
    ///
    /// `reference` is passed through as the provider-side idempotency key.
    /// Nothing is retried here: a failed request comes back to the caller.
    pub async fn place_order(
        &self,
        phone: &str,
        bundle_label: &str,
        reference: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let phone = normalize_phone(phone).map_err(|e| DeliveryError::Validation(e.to_string()))?;
        let request = TransactionRequest::new(&phone, self.volume_for_bundle(bundle_label), reference);

        info!(
            phone = %Masked(&phone),
            volume = %request.volume,
            reference,
            "Submitting delivery to provider"
        );

        let body = self.transport.submit_transaction(&request).await.map_err(|e| {
            error!(reference, error = %e, "Provider transport failure");
            DeliveryError::Transport(e)
        })?;

        let result = Self::interpret_transaction(&body, reference);
        match &result {
            Ok(receipt) => info!(reference, transaction_id = ?receipt.transaction_id, "Delivery accepted"),
            Err(e) => warn!(reference, error = %e, "Delivery refused by provider"),
        }
        result
    }

    /// Success needs both the boolean flag and the sentinel code.
    fn interpret_transaction(body: &Value, reference: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let flagged = body.get("status").and_then(Value::as_bool) == Some(true);
        let code = body.get("code").and_then(as_code);

        if flagged && code.as_deref() == Some(SUCCESS_CODE) {
            return Ok(DeliveryReceipt {
                transaction_id: body.get("transaction_id").and_then(as_text),
                reference: body
                    .get("reference")
                    .and_then(as_text)
                    .unwrap_or_else(|| reference.to_string()),
            });
        }

        let message = code
            .as_deref()
            .and_then(known_error_message)
            .map(str::to_string)
            .or_else(|| body.get("reason").and_then(as_text))
            .or_else(|| body.get("message").and_then(as_text))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());

        Err(DeliveryError::Provider { code, message })
    }

    pub async fn check_balance(&self) -> BalanceResult {
        match self.transport.fetch_balance().await {
            Ok(body) => self.interpret_balance(&body),
            Err(e) => {
                warn!(error = %e, "Balance check failed");
                self.balance_failure(e.to_string())
            }
        }
    }

    fn interpret_balance(&self, body: &Value) -> BalanceResult {
        match BALANCE_PROBES.iter().find_map(|probe| probe.extract(body)) {
            Some(available_balance) => BalanceResult {
                success: true,
                available_balance,
                currency: self.currency.clone(),
                error: None,
            },
            None => self.balance_failure("No balance field in provider response".to_string()),
        }
    }

    fn balance_failure(&self, error: String) -> BalanceResult {
        BalanceResult {
            success: false,
            available_balance: Decimal::ZERO,
            currency: self.currency.clone(),
            error: Some(error),
        }
    }

    /// Balance check phrased as a health probe.
    pub async fn test_connection(&self) -> ConnectionStatus {
        let balance = self.check_balance().await;
        if balance.success {
            ConnectionStatus {
                connected: true,
                message: format!(
                    "Provider connected | Balance: {} {}",
                    balance.currency, balance.available_balance
                ),
                balance: Some(balance.available_balance),
            }
        } else {
            ConnectionStatus {
                connected: false,
                message: format!(
                    "Connection failed: {}",
                    balance.error.unwrap_or_else(|| "unknown error".to_string())
                ),
                balance: None,
            }
        }
    }
}
