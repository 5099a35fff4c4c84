//! Chain access module
//!
//! This module provides the client and types for talking to the remote chain
//! node. The node is the system of record: all durable state lives there and
//! the monitor re-derives its view of coverage from it on every run.

/// JSON-RPC client for the chain node
mod client;
/// Wire types and decoding helpers
mod types;

pub use client::EthRpcClient;
pub use types::*;

use crate::monitor::range_event::RangeEvent;

/// Remote source of chain heights and finalization events.
///
/// The monitor worker only talks to the chain through this trait, so tests
/// and additional monitored streams can supply their own client instance.
/// Both calls may fail transiently; the caller retries.
#[async_trait::async_trait]
pub trait ChainSource: Send + Sync {
    /// Current height of the chain tip.
    async fn latest_block(&self) -> Result<u64, RpcError>;

    /// Finalization events recorded between the two heights, inclusive.
    async fn range_events(&self, from_block: u64, to_block: u64)
    -> Result<Vec<RangeEvent>, RpcError>;
}
