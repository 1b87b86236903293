use async_trait::async_trait;
use datasell_core::{ProviderTransport, TransactionRequest, TransportError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Canned provider that records every delivery request it receives.
pub struct StubTransport {
    transaction: Result<Value, TransportError>,
    balance: Result<Value, TransportError>,
    requests: Mutex<Vec<TransactionRequest>>,
}

impl StubTransport {
    pub fn replying(transaction: Value) -> Arc<Self> {
        Arc::new(Self {
            transaction: Ok(transaction),
            balance: Ok(json!({})),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_balance(balance: Value) -> Arc<Self> {
        Arc::new(Self {
            transaction: Ok(json!({})),
            balance: Ok(balance),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            transaction: Err(error.clone()),
            balance: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<TransactionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderTransport for StubTransport {
    async fn submit_transaction(&self, request: &TransactionRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.transaction.clone()
    }

    async fn fetch_balance(&self) -> Result<Value, TransportError> {
        self.balance.clone()
    }
}
