pub mod phone;
pub mod provider;
pub mod repository;

pub use phone::{normalize_phone, PhoneError};
pub use provider::{ProviderTransport, TransactionRequest, TransportError};
pub use repository::{
    merge_patch, EventHandler, OrderFeed, OrderRepository, PriceRepository, StoreError, StoreResult,
    Subscription,
};

/// Failures of the wiring between stores and the provider.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
    #[error("Provider transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type CoreResult<T> = Result<T, CoreError>;
