//! Poll driver for the sync monitor.
//!
//! The `MonitorWorker` runs the periodic fetch-merge-report cycle: it asks
//! the chain for its latest height and any new finalization events, feeds
//! them to the tracker as one batch, and hands the resulting report to the
//! reporter. The next cycle is armed only after the previous one finished,
//! so the tracker always has exactly one writer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::chain::{ChainSource, RpcError};
use crate::monitor::reporter::StatusReporter;
use crate::monitor::tracker::SyncTracker;

/// Tunables for the poll cycle.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fixed delay between checks.
    pub poll_interval: Duration,
    /// Blocks subtracted from the raw chain tip so that only near-finalized
    /// data is evaluated.
    pub finality_offset: u64,
    /// Remote fetch attempts before a cycle is abandoned.
    pub fetch_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            finality_offset: 6,
            fetch_attempts: 3,
        }
    }
}

/// Errors surfaced by a check cycle.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("chain source error: {0}")]
    Source(#[from] RpcError),
}

/// Drives one tracker against one chain source on a fixed cadence.
pub struct MonitorWorker {
    source: Arc<dyn ChainSource>,
    reporter: Box<dyn StatusReporter>,
    tracker: SyncTracker,
    config: WorkerConfig,
}

impl MonitorWorker {
    pub fn new(
        source: Arc<dyn ChainSource>,
        reporter: Box<dyn StatusReporter>,
        tracker: SyncTracker,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            reporter,
            tracker,
            config,
        }
    }

    /// Run check cycles until the shutdown signal fires.
    ///
    /// A failed cycle is logged and the cadence continues; the process never
    /// terminates on a transient fetch failure.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                result = &mut shutdown_rx => {
                    match result {
                        Ok(()) => info!("Shutdown signal received, stopping monitor"),
                        Err(_) => warn!("Shutdown channel closed, stopping monitor"),
                    }
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Check cycle failed, will retry next cycle: {}", e);
                    }
                }
            }
        }
    }

    /// One fetch-merge-report cycle.
    ///
    /// Tracker state is only committed once both fetches have succeeded, so
    /// an abandoned cycle leaves the previous status and frontier intact.
    pub async fn run_cycle(&mut self) -> Result<(), MonitorError> {
        let attempts = self.config.fetch_attempts;

        let source = Arc::clone(&self.source);
        let raw_latest = fetch_with_retry(attempts, || {
            let source = Arc::clone(&source);
            async move { source.latest_block().await }
        })
        .await?;
        let latest = raw_latest.saturating_sub(self.config.finality_offset);

        // Re-fetching the frontier block is harmless: the merge is idempotent.
        let from = self.tracker.last_checked().unwrap_or(0);
        let source = Arc::clone(&self.source);
        let events = fetch_with_retry(attempts, || {
            let source = Arc::clone(&source);
            async move { source.range_events(from, latest).await }
        })
        .await?;

        info!(
            "Fetched {} new events for blocks {} to {}",
            events.len(),
            from,
            latest
        );

        let report = self.tracker.check_and_update(events, latest);
        self.reporter.report(&report).await;
        Ok(())
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }
}

/// Retry a remote fetch a bounded number of times, with exponential backoff
/// between attempts.
async fn fetch_with_retry<T, F, Fut>(attempts: u32, mut fetch: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut policy = ExponentialBackoff::default();
    let mut attempt = 1u32;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = policy.next_backoff().unwrap_or(policy.max_interval);
                warn!(
                    "Fetch attempt {}/{} failed: {}, retrying in {:?}",
                    attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
