//! Reporting sink for per-cycle sync status.
//!
//! The worker hands every cycle's `SyncReport` to a `StatusReporter`. The
//! default `LogReporter` writes to the log, treating status edges (falling
//! out of sync, recovering) distinctly from steady state so that alerting
//! can key off the transitions.

use itertools::Itertools;
use tracing::{info, warn};

use crate::monitor::tracker::{SyncReport, SyncStatus};

/// Receives the outcome of each check cycle.
#[async_trait::async_trait]
pub trait StatusReporter: Send + Sync {
    /// Handle one cycle's report.
    async fn report(&mut self, report: &SyncReport);

    /// Get the name of this reporter for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Reporter that logs status and gaps through `tracing`.
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StatusReporter for LogReporter {
    async fn report(&mut self, report: &SyncReport) {
        let gaps = || report.missing.iter().map(ToString::to_string).join(", ");

        match (report.previous, report.current) {
            (SyncStatus::InSync, SyncStatus::OutOfSync) => {
                warn!("Updater became out of sync, missing blocks: {}", gaps());
            }
            (SyncStatus::InSync, SyncStatus::InSync) => {
                info!("Updater is still in sync");
            }
            (SyncStatus::OutOfSync, SyncStatus::InSync) => {
                info!("Updater alert resolved, it is in sync");
            }
            (SyncStatus::OutOfSync, SyncStatus::OutOfSync) => {
                warn!("Updater is still out of sync, missing blocks: {}", gaps());
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogReporter"
    }
}
