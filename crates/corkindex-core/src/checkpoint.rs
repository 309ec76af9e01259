//! Checkpoint manager: persists each chain's stream position.
//!
//! A checkpoint stores the position of the last successfully applied event.
//! Resuming from it only re-delivers events the duplicate guard already knows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::IndexerError;
use crate::types::ChainId;

/// A persisted checkpoint for one chain of an indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub chain_id: ChainId,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Block of the last processed event.
    pub block_number: u64,
    /// Log index of the last processed event.
    pub log_index: u32,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations: `MemoryCheckpointStore` here, `SqliteStore` and
/// `PostgresStore` in `corkindex-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(
        &self,
        chain_id: ChainId,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    async fn delete(&self, chain_id: ChainId, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Manages checkpoint writes for one chain.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    chain_id: ChainId,
    indexer_id: String,
    /// Save every N blocks.
    save_interval: u64,
    /// Blocks seen since the last save.
    counter: u64,
    last_block: Option<u64>,
    position: Option<(u64, u32)>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        chain_id: ChainId,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            chain_id,
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            counter: 0,
            last_block: None,
            position: None,
        }
    }

    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(self.chain_id, &self.indexer_id).await
    }

    /// Record a processed event and save once `save_interval` new blocks
    /// have been seen.
    pub async fn advance(&mut self, block_number: u64, log_index: u32) -> Result<bool, IndexerError> {
        self.position = Some((block_number, log_index));
        if self.last_block != Some(block_number) {
            self.last_block = Some(block_number);
            self.counter += 1;
        }
        if self.counter >= self.save_interval {
            self.force_save().await?;
            self.counter = 0;
            return Ok(true);
        }
        Ok(false)
    }

    /// Save the current position now (used on shutdown). No-op before the
    /// first event.
    pub async fn force_save(&self) -> Result<(), IndexerError> {
        let Some((block_number, log_index)) = self.position else {
            return Ok(());
        };
        self.store
            .save(Checkpoint {
                chain_id: self.chain_id,
                indexer_id: self.indexer_id.clone(),
                block_number,
                log_index,
                updated_at: chrono::Utc::now().timestamp(),
            })
            .await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<(ChainId, String), Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        chain_id: ChainId,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(&(chain_id, indexer_id.to_string()))
            .cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let key = (checkpoint.chain_id, checkpoint.indexer_id.clone());
        self.data.lock().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: ChainId, indexer_id: &str) -> Result<(), IndexerError> {
        self.data
            .lock()
            .unwrap()
            .remove(&(chain_id, indexer_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, 1, "my-indexer", 10);

        assert!(mgr.load().await.unwrap().is_none());

        // nothing to save before the first event
        mgr.force_save().await.unwrap();
        assert!(mgr.load().await.unwrap().is_none());

        mgr.advance(1000, 4).await.unwrap();
        mgr.force_save().await.unwrap();
        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1000);
        assert_eq!(cp.log_index, 4);
        assert_eq!(cp.chain_id, 1);
    }

    #[tokio::test]
    async fn saves_every_n_blocks_not_events() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, 1, "idx", 3);

        // three events in two blocks: no save yet
        assert!(!mgr.advance(1, 0).await.unwrap());
        assert!(!mgr.advance(1, 1).await.unwrap());
        assert!(!mgr.advance(2, 0).await.unwrap());
        assert!(mgr.load().await.unwrap().is_none());

        // third distinct block triggers the save
        assert!(mgr.advance(3, 7).await.unwrap());
        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!((cp.block_number, cp.log_index), (3, 7));
    }
}
