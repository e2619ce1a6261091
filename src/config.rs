use crate::sync::{CheckpointConfig, SyncConfig};

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Follows a CKB node and materializes CoTA NFT state into SQLite.
#[derive(Parser, Debug, Clone)]
#[command(name = "cota-syncer")]
#[command(version)]
pub struct Config {
	/// SQLite database file
	#[arg(long, env = "COTA_DATABASE_PATH", default_value = "cota-syncer.db")]
	pub database_path: PathBuf,

	/// CKB node JSON-RPC endpoint
	#[arg(long, env = "CKB_NODE_URL", default_value = "http://127.0.0.1:8114")]
	pub node_url: String,

	/// Wait between iterations when idle or after an error, in milliseconds
	#[arg(long, env = "COTA_POLL_INTERVAL_MS", default_value_t = 1000)]
	pub poll_interval_ms: u64,

	/// First block of the operation stream when it has no checkpoint
	#[arg(long, env = "COTA_START_BLOCK", default_value_t = 0)]
	pub start_block: u64,

	/// First block of the metadata stream when it has no checkpoint (defaults to --start-block)
	#[arg(long, env = "COTA_METADATA_START_BLOCK")]
	pub metadata_start_block: Option<u64>,

	/// Checkpoints kept per stream; bounds the depth of forks that can be unwound
	#[arg(
		long,
		env = "COTA_CHECKPOINT_KEEP",
		default_value_t = 100,
		value_parser = clap::value_parser!(u64).range(2..)
	)]
	pub checkpoint_keep_count: u64,

	/// Interval between checkpoint pruning runs, in seconds
	#[arg(long, env = "COTA_PRUNE_INTERVAL_SECS", default_value_t = 60)]
	pub prune_interval_secs: u64,

	/// Time given to the sync loops to finish their iteration on shutdown, in seconds
	#[arg(long, env = "COTA_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
	pub shutdown_grace_secs: u64,

	/// Timeout of a single node request, in seconds
	#[arg(long, env = "CKB_RPC_TIMEOUT_SECS", default_value_t = 30)]
	pub rpc_timeout_secs: u64,
}

impl Config {
	pub fn block_sync(&self) -> SyncConfig {
		SyncConfig {
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			start_block: self.start_block,
		}
	}

	pub fn metadata_sync(&self) -> SyncConfig {
		SyncConfig {
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			start_block: self.metadata_start_block.unwrap_or(self.start_block),
		}
	}

	pub fn checkpoints(&self) -> CheckpointConfig {
		CheckpointConfig {
			interval: Duration::from_secs(self.prune_interval_secs),
			keep_count: self.checkpoint_keep_count as usize,
		}
	}

	pub fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.shutdown_grace_secs)
	}

	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_secs(self.rpc_timeout_secs)
	}
}
