use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a delivery request as the provider expects it.
///
/// `volume` travels as a decimal string and `referrer` repeats the
/// destination number, matching the shape the provider accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub phone: String,
    pub volume: String,
    pub reference: String,
    pub referrer: String,
}

impl TransactionRequest {
    pub fn new(phone: &str, volume_mb: u32, reference: &str) -> Self {
        Self {
            phone: phone.to_string(),
            volume: volume_mb.to_string(),
            reference: reference.to_string(),
            referrer: phone.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Provider server error: {0}")]
    Status(u16),
    #[error("Could not reach provider: {0}")]
    Network(String),
    #[error("Malformed provider response: {0}")]
    MalformedBody(String),
    #[error("Invalid provider configuration: {0}")]
    Configuration(String),
}

/// Raw access to the delivery provider.
///
/// Implementations send exactly one HTTP exchange per call and hand back the
/// decoded JSON body untouched; interpreting the body is the client's job.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Submit a data delivery transaction
    async fn submit_transaction(&self, request: &TransactionRequest) -> Result<Value, TransportError>;

    /// Query the reseller wallet balance
    async fn fetch_balance(&self) -> Result<Value, TransportError>;
}
