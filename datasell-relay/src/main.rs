use anyhow::Context;
use datasell_relay::{start_delivery_worker, RelayState};
use datasell_store::{export_snapshot, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "datasell_relay=debug,datasell_store=info,datasell_order=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting {} delivery relay", config.business.name);

    let state = RelayState::from_config(&config)
        .await
        .context("Failed to set up stores and provider")?;

    // `datasell-relay export <file>` dumps the store and exits.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, path] = args.as_slice() {
        if command == "export" {
            let snapshot = export_snapshot(state.store.as_ref()).await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write snapshot to {}", path))?;
            tracing::info!(orders = snapshot.orders.len(), path = %path, "Snapshot written");
            return Ok(());
        }
    }

    let status = state.provider.test_connection().await;
    if status.connected {
        tracing::info!("{}", status.message);
    } else {
        tracing::warn!("{}", status.message);
    }

    let prices = state.store.get_prices().await?;
    for (label, price) in prices.entries() {
        tracing::debug!(bundle = %label, price = %price, currency = %config.business.currency, "Price");
    }

    let worker = start_delivery_worker(state.clone()).await?;
    if let Err(e) = worker.enqueue_paid_backlog().await {
        tracing::error!(error = %e, "Failed to work through paid backlog");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    worker.shutdown().await;
    Ok(())
}
