use crate::cota::{CotaError, TransformError};
use crate::node::NodeError;
use crate::store::StoreError;

use std::time::Duration;

/// Error types for one sync iteration
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Parse error: {0}")]
    Parse(#[from] CotaError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Errors that retrying cannot resolve; the loop stops with state left intact.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(StoreError::ForkBeyondHistory { .. }))
    }
}

/// What one iteration of a sync loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing new at the tip.
    Idle,
    /// The block was committed.
    Advanced(u64),
    /// The block was undone after a fork was detected.
    RolledBack(u64),
}

/// Configuration for a sync loop
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Wait between iterations when idle or after an error
    pub poll_interval: Duration,
    /// First block to process when the stream has no checkpoint
    pub start_block: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            start_block: 0,
        }
    }
}
