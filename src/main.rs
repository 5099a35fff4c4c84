mod chain;
mod config;
mod monitor;

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info};

use crate::chain::EthRpcClient;
use crate::monitor::reporter::LogReporter;
use crate::monitor::tracker::SyncTracker;
use crate::monitor::worker::MonitorWorker;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Starting sync monitor service");

    let settings = match config::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("Set PROVIDER_URL to a node's JSON-RPC endpoint, e.g. from infura or alchemy");
            return;
        }
    };

    let client = EthRpcClient::new(
        settings.provider_url.clone(),
        settings.contract_address.clone(),
        settings.update_event_topic.clone(),
    );
    let tracker = SyncTracker::new(settings.tracker_config());
    let worker = MonitorWorker::new(
        Arc::new(client),
        Box::new(LogReporter::new()),
        tracker,
        settings.worker_config(),
    );

    info!(
        "Monitoring update events on contract {} every {}s",
        settings.contract_address, settings.poll_interval_secs
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    info!("Sync monitor stopped");
}
