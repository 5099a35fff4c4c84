//!
//! JSON-RPC client for an Ethereum-style chain node.
//!
//! This module provides an async client for the two node calls the monitor
//! needs: the current chain height (`eth_blockNumber`) and the updater
//! contract's finalization logs (`eth_getLogs`), decoded into range events.
//! All methods are async and designed for use with Tokio.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::chain::ChainSource;
use crate::chain::types::{LogEntry, RpcError, decode_range_event, parse_quantity, to_quantity};
use crate::monitor::range_event::RangeEvent;

/// JSON-RPC client bound to one provider endpoint and one contract.
#[derive(Clone)]
pub struct EthRpcClient {
    /// The underlying HTTP client for JSON-RPC calls.
    http_client: Client,
    /// The node's JSON-RPC endpoint.
    provider_url: String,
    /// Address of the updater contract whose logs are fetched.
    contract_address: String,
    /// Optional topic filter restricting logs to the update event.
    event_topic: Option<String>,
}

impl EthRpcClient {
    /// Create a new chain client.
    ///
    /// # Arguments
    /// * `provider_url` - The node's JSON-RPC HTTP endpoint.
    /// * `contract_address` - The contract emitting the update events.
    /// * `event_topic` - Optional topic hash to filter the logs by.
    pub fn new(
        provider_url: String,
        contract_address: String,
        event_topic: Option<String>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            provider_url,
            contract_address,
            event_topic,
        }
    }

    /// Execute one JSON-RPC call and return its `result` field.
    async fn execute(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.provider_url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(RpcError::Rpc { code, message });
        }

        body.get("result").cloned().ok_or(RpcError::NoResult)
    }
}

#[async_trait::async_trait]
impl ChainSource for EthRpcClient {
    async fn latest_block(&self) -> Result<u64, RpcError> {
        let result = self.execute("eth_blockNumber", json!([])).await?;
        let quantity = result.as_str().ok_or(RpcError::NoResult)?;
        parse_quantity(quantity)
    }

    async fn range_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RangeEvent>, RpcError> {
        let mut filter = json!({
            "address": self.contract_address,
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
        });
        if let Some(topic) = &self.event_topic {
            filter["topics"] = json!([topic]);
        }

        let result = self.execute("eth_getLogs", json!([filter])).await?;
        let logs: Vec<LogEntry> = serde_json::from_value(result)?;
        debug!(
            "Fetched {} update logs for blocks {} to {}",
            logs.len(),
            from_block,
            to_block
        );

        logs.iter().map(|log| decode_range_event(&log.data)).collect()
    }
}
