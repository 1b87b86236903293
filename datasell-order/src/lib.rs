pub mod processor;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_support;

pub use processor::{DeliveryOutcome, OrderProcessor, ValidationResult};
pub use provider::{BalanceResult, ConnectionStatus, DeliveryError, DeliveryReceipt, ProviderClient};
