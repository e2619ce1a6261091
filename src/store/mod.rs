//! Versioned persistence layer.
//!
//! The store applies one block's mutations atomically together with a version row per mutation,
//! and can undo exactly one block's effects from those version rows. Checkpoints are written in
//! the same transaction as the mutations they describe, so a crash never leaves a checkpoint ahead
//! of the data.

/// Record families and row layouts
pub mod records;
/// Schema creation
mod schema;
/// SQLite implementation of the store
mod sqlite;

pub use records::*;
pub use sqlite::SqliteStore;

use crate::node::Script;

/// Independent sync streams, each with its own checkpoint history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    BlockSync,
    Metadata,
}

impl CheckpointKind {
    pub fn as_i64(self) -> i64 {
        match self {
            CheckpointKind::BlockSync => 0,
            CheckpointKind::Metadata => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CheckpointKind::BlockSync => "block-sync",
            CheckpointKind::Metadata => "metadata-sync",
        }
    }

    pub fn families(self) -> impl Iterator<Item = Family> {
        Family::ALL
            .into_iter()
            .filter(move |family| family.stream() == self)
    }
}

/// Last block whose effects are committed for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub kind: CheckpointKind,
    pub block_number: u64,
    pub block_hash: Vec<u8>,
}

/// Kind of change recorded by a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl ActionType {
    pub fn as_i64(self) -> i64 {
        match self {
            ActionType::Create => 0,
            ActionType::Update => 1,
            ActionType::Delete => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ActionType::Create),
            1 => Some(ActionType::Update),
            2 => Some(ActionType::Delete),
            _ => None,
        }
    }
}

/// One row-level change.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new row; fails if the key exists.
    Create(DomainRecord),
    /// Overwrite an existing row; fails if the key is missing.
    Update(DomainRecord),
    /// Create when the key is new, update otherwise.
    Upsert(DomainRecord),
    /// Remove an existing row; fails if the key is missing.
    Delete(RecordKey),
}

impl Mutation {
    pub fn family(&self) -> Family {
        match self {
            Mutation::Create(record) | Mutation::Update(record) | Mutation::Upsert(record) => {
                record.family()
            }
            Mutation::Delete(key) => key.family,
        }
    }
}

/// A mutation tagged with the index of the transaction that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TxMutation {
    pub tx_index: u32,
    pub mutation: Mutation,
}

/// Everything one block changes in one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMutations {
    pub checkpoint: Checkpoint,
    pub mutations: Vec<TxMutation>,
}

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("No {table} row for key {key}")]
    MissingRecord { table: &'static str, key: String },

    #[error("{family:?} mutation submitted to the {stream} stream")]
    StreamMismatch { family: Family, stream: &'static str },

    #[error("Cannot roll back block {requested}: latest committed block is {latest:?}")]
    RollbackOutOfOrder { requested: u64, latest: Option<u64> },

    #[error("Fork reaches below block {block_number}, the oldest checkpoint still kept")]
    ForkBeyondHistory { block_number: u64 },

    #[error("Corrupt version row {id} in {table}")]
    CorruptVersion { table: String, id: i64 },

    #[error("Connection lock poisoned: {0}")]
    Poisoned(String),

    #[error("Blocking task failed: {0}")]
    TaskJoin(String),
}

/// Content-addressed script table.
#[async_trait::async_trait]
pub trait ScriptRegistry: Send + Sync {
    /// Id of the row holding `script`, inserting it when absent.
    async fn find_or_create_script(&self, script: &Script) -> Result<i64, StoreError>;
}

/// Batch-apply and rollback keyed by block number.
#[async_trait::async_trait]
pub trait Store: ScriptRegistry {
    /// Latest committed checkpoint of a stream.
    async fn latest_checkpoint(
        &self,
        kind: CheckpointKind,
    ) -> Result<Option<Checkpoint>, StoreError>;

    /// Apply a block's mutations and record its checkpoint, atomically.
    async fn apply_block(&self, batch: BlockMutations) -> Result<(), StoreError>;

    /// Undo the effects of the latest committed block of a stream, atomically.
    async fn rollback_block(&self, kind: CheckpointKind, block_number: u64)
    -> Result<(), StoreError>;

    /// Keep only the newest `keep_count` checkpoints of a stream; returns rows removed.
    async fn prune_checkpoints(
        &self,
        kind: CheckpointKind,
        keep_count: usize,
    ) -> Result<usize, StoreError>;
}
