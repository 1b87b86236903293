use datasell_core::CoreResult;
use datasell_order::{OrderProcessor, ProviderClient};
use datasell_store::{
    Config, HubNetTransport, LocalOrderStore, RemoteOrderStore, StoreBackend, TieredOrderStore,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the delivery worker needs, shared across tasks.
#[derive(Clone)]
pub struct RelayState {
    pub store: Arc<dyn StoreBackend>,
    pub provider: Arc<ProviderClient>,
    pub processor: Arc<OrderProcessor>,
}

impl RelayState {
    pub fn new(store: Arc<dyn StoreBackend>, provider: Arc<ProviderClient>) -> Self {
        let processor = Arc::new(OrderProcessor::new(provider.clone()));
        Self {
            store,
            provider,
            processor,
        }
    }

    /// Open the stores and the HubNet client described by `config`.
    ///
    /// With a `redis_url` the relay runs on the remote store and falls back
    /// to the SQLite file; without one it runs on the SQLite file alone.
    pub async fn from_config(config: &Config) -> CoreResult<Self> {
        let local = Arc::new(LocalOrderStore::open(&config.store.sqlite_path).await?);

        let store: Arc<dyn StoreBackend> = match &config.store.redis_url {
            Some(url) => {
                let remote = Arc::new(RemoteOrderStore::new(url, &config.store.namespace)?);
                let tiered = TieredOrderStore::new(remote, local);
                if config.store.migrate_on_start {
                    match tiered.migrate_local().await {
                        Ok(report) => info!(
                            copied = report.copied,
                            skipped = report.skipped,
                            "Startup migration finished"
                        ),
                        Err(e) => warn!(error = %e, "Startup migration failed, continuing"),
                    }
                }
                Arc::new(tiered)
            }
            None => {
                info!("No remote store configured, using local store only");
                local
            }
        };

        let transport = Arc::new(HubNetTransport::new(&config.provider)?);
        let provider =
            Arc::new(ProviderClient::new(transport).with_currency(&config.business.currency));

        Ok(Self::new(store, provider))
    }
}
