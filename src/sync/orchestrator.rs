//! Sync loops and their coordinator.
//!
//! A `SyncLoop` follows the chain for one stream. Each iteration:
//! - Loads the stream's latest checkpoint and picks the next block (or the configured start block)
//! - Compares the candidate's parent hash with the committed hash; a mismatch rolls back the
//!   committed block and the iteration ends without advancing
//! - Otherwise parses the block through the stream's strategy and commits the mutations together
//!   with the new checkpoint
//!
//! The loop continues immediately after it advanced or rolled back, and sleeps for the poll
//! interval when idle or after an error. The `SyncOrchestrator` spawns both stream loops and the
//! checkpoint pruner, and stops them with a bounded grace period.

use crate::cota::ProtocolScripts;
use crate::node::NodeGateway;
use crate::store::{BlockMutations, Checkpoint, Store};
use crate::sync::{
    progress_tracker::SyncProgressTracker,
    state_persistence::{CheckpointConfig, CheckpointPruner},
    strategies::{BlockEntrySync, MetadataSync, SyncStrategy},
    types::{SyncConfig, SyncError, TickOutcome},
};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Follows the chain for one stream.
pub struct SyncLoop {
    node: Arc<dyn NodeGateway>,
    store: Arc<dyn Store>,
    strategy: Box<dyn SyncStrategy>,
    config: SyncConfig,
    progress: SyncProgressTracker,
}

impl SyncLoop {
    pub fn new(
        node: Arc<dyn NodeGateway>,
        store: Arc<dyn Store>,
        strategy: Box<dyn SyncStrategy>,
        config: SyncConfig,
    ) -> Self {
        let progress = SyncProgressTracker::new(strategy.kind().name(), config.start_block);
        Self {
            node,
            store,
            strategy,
            config,
            progress,
        }
    }

    /// One iteration: idle, advance by one block, or roll back one block.
    pub async fn tick(&mut self) -> Result<TickOutcome, SyncError> {
        let kind = self.strategy.kind();
        let checkpoint = self.store.latest_checkpoint(kind).await?;
        let candidate = checkpoint
            .as_ref()
            .map_or(self.config.start_block, |checkpoint| checkpoint.block_number + 1);

        let tip = self.node.tip_block_number().await?;
        if tip < candidate {
            return Ok(TickOutcome::Idle);
        }

        let Some(block) = self.node.block_by_number(candidate).await? else {
            debug!("{}: block {} not available yet", kind.name(), candidate);
            return Ok(TickOutcome::Idle);
        };

        if let Some(checkpoint) = &checkpoint {
            if !checkpoint.block_hash.is_empty() && block.header.parent_hash != checkpoint.block_hash {
                warn!(
                    "{}: fork at block {}, parent 0x{} does not match committed 0x{}; rolling back block {}",
                    kind.name(),
                    candidate,
                    hex::encode(&block.header.parent_hash),
                    hex::encode(&checkpoint.block_hash),
                    checkpoint.block_number
                );
                self.store
                    .rollback_block(kind, checkpoint.block_number)
                    .await?;
                self.progress.record_rollback(checkpoint.block_number);
                return Ok(TickOutcome::RolledBack(checkpoint.block_number));
            }
        }

        let work = self.strategy.block_work(self.node.as_ref(), &block).await?;
        let mutation_count = work.mutations.len();
        self.store
            .apply_block(BlockMutations {
                checkpoint: Checkpoint {
                    kind,
                    block_number: block.header.number,
                    block_hash: block.header.hash.clone(),
                },
                mutations: work.mutations,
            })
            .await?;

        self.progress
            .record_block(block.header.number, work.entries, mutation_count);
        self.progress.log_progress(false);
        Ok(TickOutcome::Advanced(block.header.number))
    }

    /// Iterate until shutdown is signalled or a fatal error; the current iteration always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let name = self.strategy.name();
        info!(
            "Starting {} for the {} stream",
            name,
            self.strategy.kind().name()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.tick().await {
                Ok(TickOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) if e.is_fatal() => {
                    error!("{} cannot continue: {}", name, e);
                    break;
                }
                Err(e) => {
                    error!("{} iteration failed: {}", name, e);
                    true
                }
            };

            if wait {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        self.progress.log_progress(true);
        info!("{} stopped: {}", name, self.progress.get_stats().summary());
    }
}

/// Spawns the stream loops and the pruner, and stops them on request.
pub struct SyncOrchestrator {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SyncOrchestrator {
    pub fn start(
        node: Arc<dyn NodeGateway>,
        store: Arc<dyn Store>,
        scripts: ProtocolScripts,
        block_config: SyncConfig,
        metadata_config: SyncConfig,
        checkpoint_config: CheckpointConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let block_loop = SyncLoop::new(
            node.clone(),
            store.clone(),
            Box::new(BlockEntrySync::new(scripts.clone(), store.clone())),
            block_config,
        );
        let metadata_loop = SyncLoop::new(
            node,
            store.clone(),
            Box::new(MetadataSync::new(scripts)),
            metadata_config,
        );
        let pruner = CheckpointPruner::new(store, checkpoint_config);

        let tasks = vec![
            ("block-sync", tokio::spawn(block_loop.run(shutdown_rx.clone()))),
            ("metadata-sync", tokio::spawn(metadata_loop.run(shutdown_rx.clone()))),
            ("checkpoint-pruner", tokio::spawn(pruner.run(shutdown_rx))),
        ];

        Self { shutdown_tx, tasks }
    }

    /// Signal shutdown, wait up to `grace` for the tasks, then abort the rest.
    pub async fn shutdown(mut self, grace: Duration) {
        info!("Beginning graceful shutdown of {} tasks", self.tasks.len());
        let _ = self.shutdown_tx.send(true);

        let pending = self.tasks.iter_mut().map(|(_, handle)| handle);
        if tokio::time::timeout(grace, futures::future::join_all(pending))
            .await
            .is_err()
        {
            warn!("Shutdown timed out after {:?}", grace);
        }

        for (name, handle) in &self.tasks {
            if !handle.is_finished() {
                warn!("Aborting task '{}'", name);
                handle.abort();
            }
        }
        info!("Graceful shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cota::entries::ProtocolVersion;
    use crate::cota::entries::builder::{define_entries, mint_entries};
    use crate::cota::molecule::encode_script;
    use crate::node::NodeError;
    use crate::store::{
        CheckpointKind, DefineRecord, Family, IssuerRecord, SqliteStore, StoreError,
    };
    use crate::test_utils::{MockNode, block, block_hash, lock, protocol_tx};

    const COTA_ID: [u8; 20] = [0x71; 20];

    fn define_payload() -> Vec<u8> {
        let mut payload = vec![1u8];
        payload.extend(define_entries(COTA_ID, 100));
        payload
    }

    fn setup() -> (Arc<MockNode>, Arc<SqliteStore>) {
        (
            Arc::new(MockNode::new()),
            Arc::new(SqliteStore::open_memory().unwrap()),
        )
    }

    fn config(start_block: u64) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_millis(10),
            start_block,
        }
    }

    fn block_loop(node: &Arc<MockNode>, store: &Arc<SqliteStore>, start_block: u64) -> SyncLoop {
        SyncLoop::new(
            node.clone(),
            store.clone(),
            Box::new(BlockEntrySync::new(ProtocolScripts::for_chain(false), store.clone())),
            config(start_block),
        )
    }

    fn metadata_loop(node: &Arc<MockNode>, store: &Arc<SqliteStore>) -> SyncLoop {
        SyncLoop::new(
            node.clone(),
            store.clone(),
            Box::new(MetadataSync::new(ProtocolScripts::for_chain(false))),
            config(1),
        )
    }

    #[tokio::test]
    async fn idle_without_new_blocks() {
        let (node, store) = setup();
        let mut sync = block_loop(&node, &store, 1);
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Idle);

        node.set_block(block(1, 0, 0, Vec::new()));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(1));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn starts_at_configured_block() {
        let (node, store) = setup();
        for number in 1..=6 {
            node.set_block(block(number, 0, 0, Vec::new()));
        }
        let mut sync = block_loop(&node, &store, 5);
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(5));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(6));

        let checkpoint = store
            .latest_checkpoint(CheckpointKind::BlockSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.block_hash, block_hash(6, 0));
    }

    #[tokio::test]
    async fn fork_rolls_back_exactly_one_block() {
        let (node, store) = setup();
        node.set_block(block(1, 0, 0, Vec::new()));
        node.set_block(block(2, 0, 0, Vec::new()));
        let define = protocol_tx(&node, 1, Some(define_payload()), None);
        node.set_block(block(3, 0, 0, vec![define]));

        let mut sync = block_loop(&node, &store, 1);
        for expected in 1..=3 {
            assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(expected));
        }
        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert_eq!(defines.len(), 1);

        // block 3 is replaced on a competing chain
        node.truncate_above(2);
        node.set_block(block(3, 1, 0, Vec::new()));
        node.set_block(block(4, 1, 1, Vec::new()));

        assert_eq!(sync.tick().await.unwrap(), TickOutcome::RolledBack(3));
        let checkpoint = store
            .latest_checkpoint(CheckpointKind::BlockSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.block_number, 2);
        assert_eq!(checkpoint.block_hash, block_hash(2, 0));
        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert!(defines.is_empty());
        assert!(store.versions(Family::Define, 3).await.unwrap().is_empty());

        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(3));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(4));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(sync.progress.get_stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn retry_after_interrupted_block_commits_once() {
        let (node, store) = setup();
        node.set_block(block(1, 0, 0, Vec::new()));
        let define = protocol_tx(&node, 1, Some(define_payload()), None);
        let second = block(2, 0, 0, vec![define]);
        node.set_block(second.clone());

        let mut sync = block_loop(&node, &store, 1);
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(1));

        // parsed but never committed
        let strategy = BlockEntrySync::new(ProtocolScripts::for_chain(false), store.clone());
        let work = strategy.block_work(node.as_ref(), &second).await.unwrap();
        assert_eq!(work.mutations.len(), 1);
        drop(work);

        node.fail_block_fetch(Some(2));
        assert!(matches!(
            sync.tick().await,
            Err(SyncError::Node(NodeError::RpcError { .. }))
        ));
        node.fail_block_fetch(None);

        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(2));
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::Idle);

        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert_eq!(defines.len(), 1);
        assert_eq!(store.versions(Family::Define, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_checkpoint_in_place() {
        let (node, store) = setup();
        // mint of a class that was never defined
        let mut payload = vec![2u8];
        payload.extend(mint_entries(
            ProtocolVersion::V1,
            COTA_ID,
            100,
            0,
            &encode_script(&lock(2)),
        ));
        let mint = protocol_tx(&node, 1, Some(payload), None);
        node.set_block(block(1, 0, 0, vec![mint]));

        let mut sync = block_loop(&node, &store, 1);
        for _ in 0..2 {
            assert!(matches!(
                sync.tick().await,
                Err(SyncError::Store(StoreError::MissingRecord { .. }))
            ));
        }
        assert!(store
            .latest_checkpoint(CheckpointKind::BlockSync)
            .await
            .unwrap()
            .is_none());
        assert!(store.versions(Family::Withdraw, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_stream_is_independent() {
        let (node, store) = setup();
        let json = br#"{"id":"cota","ver":"1.0","metadata":{"target":"output#0","type":"issuer","data":{"name":"Alice"}}}"#;
        let tx = protocol_tx(&node, 1, Some(define_payload()), Some(json.to_vec()));
        node.set_block(block(1, 0, 0, vec![tx]));

        let mut metadata = metadata_loop(&node, &store);
        assert_eq!(metadata.tick().await.unwrap(), TickOutcome::Advanced(1));

        let issuers: Vec<IssuerRecord> = store.records().await.unwrap();
        assert_eq!(issuers.len(), 1);
        assert_eq!(issuers[0].name, "Alice");
        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert!(defines.is_empty());
        assert!(store
            .latest_checkpoint(CheckpointKind::BlockSync)
            .await
            .unwrap()
            .is_none());

        let mut blocks = block_loop(&node, &store, 1);
        assert_eq!(blocks.tick().await.unwrap(), TickOutcome::Advanced(1));
        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert_eq!(defines.len(), 1);
    }

    #[tokio::test]
    async fn fork_below_kept_checkpoints_stops_the_loop() {
        let (node, store) = setup();
        let define = protocol_tx(&node, 1, Some(define_payload()), None);
        node.set_block(block(1, 0, 0, vec![define]));
        for number in 2..=4 {
            node.set_block(block(number, 0, 0, Vec::new()));
        }

        let mut sync = block_loop(&node, &store, 1);
        for expected in 1..=4 {
            assert_eq!(sync.tick().await.unwrap(), TickOutcome::Advanced(expected));
        }
        store.prune_checkpoints(CheckpointKind::BlockSync, 2).await.unwrap();

        // blocks 2..4 are replaced on a competing chain
        node.truncate_above(1);
        for number in 2..=5 {
            node.set_block(block(number, 1, if number == 2 { 0 } else { 1 }, Vec::new()));
        }

        assert_eq!(sync.tick().await.unwrap(), TickOutcome::RolledBack(4));
        let err = sync.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SyncError::Store(StoreError::ForkBeyondHistory { block_number: 3 })
        ));

        // nothing was undone or re-applied
        let checkpoint = store
            .latest_checkpoint(CheckpointKind::BlockSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(checkpoint.block_number, 3);
        let defines: Vec<DefineRecord> = store.records().await.unwrap();
        assert_eq!(defines.len(), 1);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(1), sync.run(shutdown_rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (node, store) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(block_loop(&node, &store, 1).run(shutdown_rx));

        node.set_block(block(1, 0, 0, Vec::new()));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn orchestrator_follows_both_streams() {
        let (node, store) = setup();
        for number in 1..=3 {
            node.set_block(block(number, 0, 0, Vec::new()));
        }

        let orchestrator = SyncOrchestrator::start(
            node.clone(),
            store.clone(),
            ProtocolScripts::for_chain(false),
            config(1),
            config(1),
            CheckpointConfig::default(),
        );

        let caught_up = async {
            loop {
                let mut done = true;
                for kind in [CheckpointKind::BlockSync, CheckpointKind::Metadata] {
                    let latest = store.latest_checkpoint(kind).await.unwrap();
                    done &= latest.map(|c| c.block_number) == Some(3);
                }
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), caught_up)
            .await
            .unwrap();

        orchestrator.shutdown(Duration::from_secs(1)).await;
    }
}
