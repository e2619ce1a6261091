use crate::cota::{
	Entry, EntryDispatcher, EntryPayload, ProtocolScripts, WitnessEntryParser, parse_metadata,
};
use crate::node::{Block, NodeGateway};
use crate::store::{CheckpointKind, Store, TxMutation};
use crate::sync::types::SyncError;

use std::sync::Arc;
use tracing::debug;

/// Mutations extracted from one block by a strategy.
#[derive(Debug, Default)]
pub struct BlockWork {
	/// Entries the block contributed to this stream
	pub entries: usize,
	pub mutations: Vec<TxMutation>,
}

/// Trait for the per-stream block processing
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
	/// Stream whose checkpoint and tables this strategy owns
	fn kind(&self) -> CheckpointKind;

	/// Parse a block and build its mutations, without writing anything
	async fn block_work(&self, node: &dyn NodeGateway, block: &Block) -> Result<BlockWork, SyncError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Strategy for the protocol operation stream: define, mint, withdraw, claim, update, transfer
/// and registry entries.
pub struct BlockEntrySync {
	parser: WitnessEntryParser,
	dispatcher: EntryDispatcher<dyn Store>,
}

impl BlockEntrySync {
	pub fn new(scripts: ProtocolScripts, store: Arc<dyn Store>) -> Self {
		Self {
			parser: WitnessEntryParser::new(scripts),
			dispatcher: EntryDispatcher::new(store),
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for BlockEntrySync {
	fn kind(&self) -> CheckpointKind {
		CheckpointKind::BlockSync
	}

	async fn block_work(&self, node: &dyn NodeGateway, block: &Block) -> Result<BlockWork, SyncError> {
		let entries: Vec<Entry> = self
			.parser
			.parse_block(node, block)
			.await?
			.into_iter()
			.filter(|entry| matches!(entry.payload, EntryPayload::InputType(_)))
			.collect();

		let mut work = BlockWork {
			entries: entries.len(),
			mutations: Vec::new(),
		};
		for entry in &entries {
			work.mutations
				.extend(self.dispatcher.dispatch(entry, block.header.number).await?);
		}

		if work.entries > 0 {
			debug!(
				"Block {}: {} entries, {} mutations",
				block.header.number,
				work.entries,
				work.mutations.len()
			);
		}
		Ok(work)
	}

	fn name(&self) -> &'static str {
		"BlockEntrySync"
	}
}

/// Strategy for the metadata stream: issuer and class information.
pub struct MetadataSync {
	parser: WitnessEntryParser,
}

impl MetadataSync {
	pub fn new(scripts: ProtocolScripts) -> Self {
		Self {
			parser: WitnessEntryParser::new(scripts),
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for MetadataSync {
	fn kind(&self) -> CheckpointKind {
		CheckpointKind::Metadata
	}

	async fn block_work(&self, node: &dyn NodeGateway, block: &Block) -> Result<BlockWork, SyncError> {
		let entries = self.parser.parse_block(node, block).await?;
		let mut work = BlockWork::default();
		for entry in &entries {
			if !matches!(entry.payload, EntryPayload::OutputType(_)) {
				continue;
			}
			work.entries += 1;
			work.mutations
				.extend(parse_metadata(entry, block.header.number));
		}
		Ok(work)
	}

	fn name(&self) -> &'static str {
		"MetadataSync"
	}
}
