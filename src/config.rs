//! Environment-based configuration.
//!
//! All settings come from the environment (or a `.env` file when present).
//! `PROVIDER_URL` is the only required value; everything else has a default
//! matching the deployed monitor. Loading fails fast, before any tracking
//! begins.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

use crate::monitor::tracker::TrackerConfig;
use crate::monitor::worker::WorkerConfig;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// JSON-RPC endpoint of the chain node.
    pub provider_url: String,
    /// Address of the updater contract whose logs are monitored.
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    /// Optional topic hash restricting the log filter to the update event.
    #[serde(default)]
    pub update_event_topic: Option<String>,
    /// Seconds between check cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Blocks subtracted from the raw chain tip before evaluation.
    #[serde(default = "default_finality_offset")]
    pub finality_offset: u64,
    /// Trailing distance from the frontier not yet reported as a gap.
    #[serde(default = "default_gap_tolerance")]
    pub gap_tolerance: u64,
    /// Remote fetch attempts before a cycle is abandoned.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    /// Comma-separated heights whose leading gap is known and accepted.
    #[serde(default)]
    pub accepted_gap_starts: Vec<u64>,
}

fn default_contract_address() -> String {
    // The v1 updater contract the monitor was built for.
    "0xF990f9CB1A0aa6B51c0720a6f4cAe577d7AbD86A".to_string()
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_finality_offset() -> u64 {
    6
}

fn default_gap_tolerance() -> u64 {
    192
}

fn default_fetch_attempts() -> u32 {
    3
}

impl Settings {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            gap_tolerance: self.gap_tolerance,
            accepted_leading_gaps: BTreeSet::from_iter(self.accepted_gap_starts.iter().copied()),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            finality_offset: self.finality_offset,
            fetch_attempts: self.fetch_attempts,
        }
    }
}

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment error: {0}")]
    Env(#[from] envy::Error),
}

/// Load settings from the environment, reading `.env` first when present.
pub fn load() -> Result<Settings, ConfigError> {
    dotenv::dotenv().ok();
    Ok(envy::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_monitor() {
        assert_eq!(default_poll_interval_secs(), 20);
        assert_eq!(default_finality_offset(), 6);
        assert_eq!(default_gap_tolerance(), 192);
        assert_eq!(default_fetch_attempts(), 3);
    }

    #[test]
    fn settings_convert_into_component_configs() {
        let settings = Settings {
            provider_url: "http://localhost:8545".to_string(),
            contract_address: default_contract_address(),
            update_event_topic: None,
            poll_interval_secs: 5,
            finality_offset: 6,
            gap_tolerance: 64,
            fetch_attempts: 2,
            accepted_gap_starts: vec![17031168],
        };

        let tracker = settings.tracker_config();
        assert_eq!(tracker.gap_tolerance, 64);
        assert!(tracker.accepted_leading_gaps.contains(&17031168));

        let worker = settings.worker_config();
        assert_eq!(worker.poll_interval, Duration::from_secs(5));
        assert_eq!(worker.fetch_attempts, 2);
    }
}
