//!
//! JSON-RPC client for a CKB full node.
//!
//! This module provides an async client for the handful of node RPC methods the syncer needs:
//! tip height, block by number, transaction by hash and chain info. All methods are async and
//! designed for use with Tokio.

use super::NodeGateway;
use super::types::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// CKB node JSON-RPC client
pub struct CkbNodeClient {
	/// The underlying HTTP client for RPC requests.
	http_client: Client,
	/// The node RPC endpoint.
	node_url: String,
	/// Monotonic JSON-RPC request id.
	next_id: AtomicU64,
}

impl CkbNodeClient {
	/// Create a new node client.
	///
	/// # Arguments
	/// * `node_url` - The HTTP endpoint of the node RPC.
	/// * `timeout` - Per-request timeout.
	///
	/// # Errors
	/// Returns `NodeError` if the HTTP client cannot be built.
	pub fn new(node_url: String, timeout: Duration) -> Result<Self, NodeError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			node_url,
			next_id: AtomicU64::new(1),
		})
	}

	/// Execute a JSON-RPC call and decode its `result`.
	///
	/// A `null` result is returned as `None` so callers can distinguish "not found" from errors.
	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<Option<T>, NodeError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		debug!("Calling node method {} (id {})", method, id);

		let response = self
			.http_client
			.post(&self.node_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?
			.error_for_status()?;

		let mut response_json: serde_json::Value = response.json().await?;

		if let Some(error) = response_json.get("error").filter(|e| !e.is_null()) {
			let error: RpcErrorObject = serde_json::from_value(error.clone())?;
			return Err(NodeError::RpcError {
				code: error.code,
				message: error.message,
			});
		}

		match response_json.get_mut("result").map(serde_json::Value::take) {
			None | Some(serde_json::Value::Null) => Ok(None),
			Some(result) => Ok(Some(serde_json::from_value(result)?)),
		}
	}
}

#[async_trait::async_trait]
impl NodeGateway for CkbNodeClient {
	async fn tip_block_number(&self) -> Result<u64, NodeError> {
		let raw: String = self
			.call("get_tip_block_number", json!([]))
			.await?
			.ok_or_else(|| NodeError::NoData("tip block number".to_string()))?;
		u64::from_str_radix(raw.trim_start_matches("0x"), 16)
			.map_err(|e| NodeError::NoData(format!("invalid tip block number {}: {}", raw, e)))
	}

	async fn block_by_number(&self, number: u64) -> Result<Option<Block>, NodeError> {
		self.call("get_block_by_number", json!([format!("{:#x}", number)]))
			.await
	}

	async fn transaction(&self, hash: &[u8]) -> Result<Option<Transaction>, NodeError> {
		let response: Option<TransactionWithStatus> = self
			.call("get_transaction", json!([format!("0x{}", hex::encode(hash))]))
			.await?;
		Ok(response.and_then(|r| r.transaction))
	}

	async fn chain_info(&self) -> Result<ChainInfo, NodeError> {
		self.call("get_blockchain_info", json!([]))
			.await?
			.ok_or_else(|| NodeError::NoData("blockchain info".to_string()))
	}
}
