use async_trait::async_trait;
use datasell_core::{ProviderTransport, TransactionRequest, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::app_config::ProviderConfig;

/// HTTP transport for the HubNet reseller API.
pub struct HubNetTransport {
    client: reqwest::Client,
    transaction_url: String,
    balance_url: String,
}

impl HubNetTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self, TransportError> {
        if config.api_key.trim().is_empty() {
            return Err(TransportError::Configuration("missing API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        // HubNet reads the key from a `token` header, not `Authorization`.
        let mut token = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| TransportError::Configuration(format!("invalid API key: {e}")))?;
        token.set_sensitive(true);
        headers.insert("token", token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            transaction_url: format!(
                "{}/mtn-new-transaction",
                config.base_url.trim_end_matches('/')
            ),
            balance_url: config.balance_url.clone(),
        })
    }

    async fn decode(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

#[async_trait]
impl ProviderTransport for HubNetTransport {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn submit_transaction(&self, request: &TransactionRequest) -> Result<Value, TransportError> {
        debug!(volume = %request.volume, "Submitting transaction to HubNet");
        let response = self
            .client
            .post(&self.transaction_url)
            .json(request)
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    #[instrument(skip(self))]
    async fn fetch_balance(&self) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(&self.balance_url)
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }
}
