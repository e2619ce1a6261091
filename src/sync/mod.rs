//! Chain synchronization module
//!
//! Each sync stream follows the chain block by block, rolls back its latest block when the chain
//! forks, and commits the mutations of every new block together with its checkpoint:
//!
//! - `orchestrator`: The per-stream sync loop and the coordinator that spawns and stops all loops.
//! - `strategies`: What a stream extracts from a block (protocol operations or metadata).
//! - `progress_tracker`: Per-stream counters and periodic progress logs.
//! - `state_persistence`: Checkpoint retention and the pruning task.
//! - `types`: Errors, loop outcomes and configuration.

/// Sync loops and their coordinator
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Checkpoint retention
pub mod state_persistence;
/// Pluggable block strategies per stream
pub mod strategies;
/// Shared sync types
pub mod types;

pub use orchestrator::SyncOrchestrator;
pub use state_persistence::CheckpointConfig;
pub use types::SyncConfig;
