//! Checkpoint retention.
//!
//! Every committed block appends a checkpoint row for its stream. Rolling back a block needs the
//! checkpoint of its parent, so the history bounds how deep a fork can be unwound. The pruner runs
//! on its own timer and only ever touches checkpoint rows.

use crate::store::{CheckpointKind, Store, StoreError};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Configuration for checkpoint retention.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Run pruning every interval.
    pub interval: Duration,
    /// Number of checkpoints to keep per stream.
    pub keep_count: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            keep_count: 100,
        }
    }
}

/// Housekeeping task that trims checkpoint history.
pub struct CheckpointPruner {
    store: Arc<dyn Store>,
    config: CheckpointConfig,
}

impl CheckpointPruner {
    pub fn new(store: Arc<dyn Store>, config: CheckpointConfig) -> Self {
        Self { store, config }
    }

    /// Prune every stream once; returns the number of rows removed.
    pub async fn prune_once(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for kind in [CheckpointKind::BlockSync, CheckpointKind::Metadata] {
            let count = self
                .store
                .prune_checkpoints(kind, self.config.keep_count)
                .await?;
            if count > 0 {
                debug!("Pruned {} {} checkpoints", count, kind.name());
            }
            removed += count;
        }
        Ok(removed)
    }

    /// Prune on a timer until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Checkpoint pruning every {}s, keeping {} per stream",
            self.config.interval.as_secs(),
            self.config.keep_count
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.prune_once().await {
                error!("Checkpoint pruning failed: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Checkpoint pruner stopped");
    }
}
