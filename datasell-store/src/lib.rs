pub mod app_config;
#[cfg(test)]
mod contract;
pub mod database;
pub mod events;
pub mod export;
pub mod hubnet;
pub mod order_repo;
pub mod redis_repo;
pub mod tiered;

pub use app_config::Config;
pub use database::DbClient;
pub use events::EventBus;
pub use export::{export_snapshot, StoreSnapshot};
pub use hubnet::HubNetTransport;
pub use order_repo::LocalOrderStore;
pub use redis_repo::RemoteOrderStore;
pub use tiered::{MigrationReport, StoreBackend, TieredOrderStore};
