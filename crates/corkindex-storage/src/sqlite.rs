//! SQLite storage backend for corkindex.
//!
//! Persists entity documents and checkpoints to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use corkindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./cork.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use corkindex_core::checkpoint::{Checkpoint, CheckpointStore};
use corkindex_core::error::IndexerError;
use corkindex_core::model::EntityKind;
use corkindex_core::store::{EntityStore, Write};
use corkindex_core::types::ChainId;

use crate::check_field;

/// SQLite-backed storage for entities and checkpoints.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./cork.db"`) or a full
    /// SQLite URL (`"sqlite:./cork.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every pooled connection to `:memory:` would see its own database, so
    /// the pool holds exactly one. All data is lost when it is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id   TEXT NOT NULL,
                doc  TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                chain_id     INTEGER NOT NULL,
                indexer_id   TEXT    NOT NULL,
                block_number INTEGER NOT NULL,
                log_index    INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, indexer_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Every document of `kind`, ordered by id.
    pub async fn all(&self, kind: EntityKind) -> Result<Vec<Value>, IndexerError> {
        let rows = sqlx::query("SELECT doc FROM entities WHERE kind = ? ORDER BY id")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        rows.iter().map(parse_doc).collect()
    }
}

fn parse_doc(row: &sqlx::sqlite::SqliteRow) -> Result<Value, IndexerError> {
    let doc: String = row.get("doc");
    Ok(serde_json::from_str(&doc)?)
}

// ─── EntityStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, IndexerError> {
        let row = sqlx::query("SELECT doc FROM entities WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.as_ref().map(parse_doc).transpose()
    }

    async fn find(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, IndexerError> {
        check_field(field)?;
        let rows = sqlx::query(
            "SELECT doc FROM entities
             WHERE kind = ? AND json_extract(doc, ?) = ?
             ORDER BY id",
        )
        .bind(kind.as_str())
        .bind(format!("$.{field}"))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        rows.iter().map(parse_doc).collect()
    }

    async fn upsert_batch(&self, writes: Vec<Write>) -> Result<(), IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let n = writes.len();
        for w in writes {
            let doc = serde_json::to_string(&w.doc)?;
            sqlx::query("INSERT OR REPLACE INTO entities (kind, id, doc) VALUES (?, ?, ?)")
                .bind(w.kind.as_str())
                .bind(&w.id)
                .bind(&doc)
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(writes = n, "batch committed");
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM entities WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(
        &self,
        chain_id: ChainId,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT chain_id, indexer_id, block_number, log_index, updated_at
             FROM checkpoints WHERE chain_id = ? AND indexer_id = ?",
        )
        .bind(chain_id as i64)
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| Checkpoint {
            chain_id: r.get::<i64, _>("chain_id") as ChainId,
            indexer_id: r.get("indexer_id"),
            block_number: r.get::<i64, _>("block_number") as u64,
            log_index: r.get::<i64, _>("log_index") as u32,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints
             (chain_id, indexer_id, block_number, log_index, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(checkpoint.chain_id as i64)
        .bind(&checkpoint.indexer_id)
        .bind(checkpoint.block_number as i64)
        .bind(checkpoint.log_index as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(
            chain_id = checkpoint.chain_id,
            indexer_id = %checkpoint.indexer_id,
            block = checkpoint.block_number,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, chain_id: ChainId, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoints WHERE chain_id = ? AND indexer_id = ?")
            .bind(chain_id as i64)
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
