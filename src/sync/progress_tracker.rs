//! Progress tracking for a sync stream.
//!
//! The tracker counts committed blocks, parsed entries, applied mutations and rollbacks, logs
//! progress every 1000 blocks and produces a summary when the stream stops.

use tracing::info;

const LOG_EVERY_BLOCKS: u64 = 1000;

/// Service for tracking synchronization progress of one stream
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    stream: &'static str,
    /// Block the stream resumed from
    start_block: u64,
    /// The highest block committed in this session
    highest_block: u64,
    has_processed_data: bool,
    blocks_processed: usize,
    entries_processed: usize,
    mutations_applied: usize,
    rollbacks: usize,
    /// Last block at which we logged progress
    last_logged_block: u64,
}

impl SyncProgressTracker {
    pub fn new(stream: &'static str, start_block: u64) -> Self {
        Self {
            stream,
            start_block,
            highest_block: start_block,
            has_processed_data: false,
            blocks_processed: 0,
            entries_processed: 0,
            mutations_applied: 0,
            rollbacks: 0,
            last_logged_block: start_block,
        }
    }

    /// Record a committed block
    pub fn record_block(&mut self, block_number: u64, entries: usize, mutations: usize) {
        if !self.has_processed_data {
            self.start_block = block_number;
            self.last_logged_block = block_number;
        }
        self.highest_block = block_number;
        self.has_processed_data = true;
        self.blocks_processed += 1;
        self.entries_processed += entries;
        self.mutations_applied += mutations;
    }

    /// Record a block undone after a fork
    pub fn record_rollback(&mut self, block_number: u64) {
        self.rollbacks += 1;
        self.highest_block = block_number.saturating_sub(1);
        self.last_logged_block = self.last_logged_block.min(self.highest_block);
    }

    /// Log progress every 1000 blocks or when forced
    pub fn log_progress(&mut self, force: bool) {
        let blocks_since_last_log = self.highest_block.saturating_sub(self.last_logged_block);
        let should_log = force || blocks_since_last_log >= LOG_EVERY_BLOCKS;

        if should_log && self.has_processed_data {
            info!(
                "{} progress: {} blocks, {} entries, {} mutations up to block {}",
                self.stream,
                self.blocks_processed,
                self.entries_processed,
                self.mutations_applied,
                self.highest_block
            );
            self.last_logged_block = self.highest_block;
        }
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            stream: self.stream,
            start_block: self.start_block,
            highest_block: self.highest_block,
            has_processed_data: self.has_processed_data,
            blocks_processed: self.blocks_processed,
            entries_processed: self.entries_processed,
            mutations_applied: self.mutations_applied,
            rollbacks: self.rollbacks,
        }
    }
}

/// Statistics about one stream's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub stream: &'static str,
    pub start_block: u64,
    pub highest_block: u64,
    pub has_processed_data: bool,
    pub blocks_processed: usize,
    pub entries_processed: usize,
    pub mutations_applied: usize,
    pub rollbacks: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        if !self.has_processed_data {
            return format!("{}: no blocks processed", self.stream);
        }
        format!(
            "{} from {} to {}: {} blocks, {} entries, {} mutations{}",
            self.stream,
            self.start_block,
            self.highest_block,
            self.blocks_processed,
            self.entries_processed,
            self.mutations_applied,
            if self.rollbacks == 0 {
                String::new()
            } else {
                format!(" ({} rollbacks)", self.rollbacks)
            }
        )
    }
}
