mod config;
mod cota;
mod node;
mod store;
mod sync;
#[cfg(test)]
mod test_utils;
mod utils;

use backoff::{ExponentialBackoff, future::retry};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::cota::ProtocolScripts;
use crate::node::{CkbNodeClient, NodeError, NodeGateway};
use crate::store::{SqliteStore, StoreError};
use crate::sync::SyncOrchestrator;

/// Errors that stop the service before the sync loops start
#[derive(Debug, thiserror::Error)]
enum StartupError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Node error: {0}")]
	Node(#[from] NodeError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	// Debug logging for the syncer itself, INFO for everything else
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("cota_syncer=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = Config::parse();
	info!("Starting cota syncer");

	if let Err(e) = run(config).await {
		error!("Syncer stopped: {}", e);
		std::process::exit(1);
	}
}

async fn run(config: Config) -> Result<(), StartupError> {
	let store = Arc::new(SqliteStore::open(&config.database_path)?);
	info!("Opened database {}", config.database_path.display());

	let node = Arc::new(CkbNodeClient::new(
		config.node_url.clone(),
		config.rpc_timeout(),
	)?);

	let chain = retry(ExponentialBackoff::default(), || async {
		node.chain_info().await.map_err(|e| {
			warn!("Chain info unavailable: {}", e);
			backoff::Error::transient(e)
		})
	})
	.await?;
	info!(
		"Connected to {} at {} ({})",
		chain.chain,
		config.node_url,
		if chain.is_mainnet() { "mainnet scripts" } else { "testnet scripts" }
	);

	let orchestrator = SyncOrchestrator::start(
		node,
		store,
		ProtocolScripts::for_chain(chain.is_mainnet()),
		config.block_sync(),
		config.metadata_sync(),
		config.checkpoints(),
	);

	tokio::signal::ctrl_c().await?;
	info!("Shutdown signal received");
	orchestrator.shutdown(config.shutdown_grace()).await;
	Ok(())
}
