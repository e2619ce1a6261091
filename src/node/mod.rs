//! Node integration module for the CKB chain
//!
//! This module provides the gateway trait the sync loops consume and its JSON-RPC implementation.
//! The gateway only reads chain data: tip height, blocks, transactions and chain identity.

/// JSON-RPC client for a CKB full node
mod client;
/// Wire types for node responses
mod types;

pub use client::CkbNodeClient;
pub use types::*;

/// Read-only view of the chain consumed by the syncer.
///
/// Calls may block on the network; callers simply await them.
#[async_trait::async_trait]
pub trait NodeGateway: Send + Sync {
	/// Height of the current chain tip.
	async fn tip_block_number(&self) -> Result<u64, NodeError>;

	/// Block at the given height, `None` if the node does not have it.
	async fn block_by_number(&self, number: u64) -> Result<Option<Block>, NodeError>;

	/// Transaction by hash, used to resolve previous outputs of inputs.
	async fn transaction(&self, hash: &[u8]) -> Result<Option<Transaction>, NodeError>;

	/// Chain identity, selects the protocol type scripts.
	async fn chain_info(&self) -> Result<ChainInfo, NodeError>;
}
