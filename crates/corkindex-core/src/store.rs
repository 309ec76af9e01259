//! Entity storage interface.
//!
//! The engine only needs three operations from the persisted store:
//! point lookup by id, query by an indexed field, and a batched upsert by id.
//! Documents are JSON values; [`Db`] layers typed access on top.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::IndexerError;
use crate::model::{Entity, EntityKind};

/// One pending upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub kind: EntityKind,
    pub id: String,
    pub doc: Value,
}

/// Backend-agnostic document store.
///
/// Implementations: [`MemoryStore`] here, SQLite and Postgres in
/// `corkindex-storage`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, IndexerError>;

    /// Every document of `kind` whose string field `field` equals `value`,
    /// ordered by id.
    async fn find(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, IndexerError>;

    /// Apply a batch of upserts atomically. Later writes to the same id win.
    async fn upsert_batch(&self, writes: Vec<Write>) -> Result<(), IndexerError>;

    /// Number of documents of `kind`.
    async fn count(&self, kind: EntityKind) -> Result<u64, IndexerError>;
}

// ─── Effects ──────────────────────────────────────────────────────────────────

/// The writes produced by applying one event, in first-write order.
#[derive(Debug, Default, Clone)]
pub struct Effects {
    writes: IndexMap<(EntityKind, String), Value>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write; a later write to the same key replaces the earlier one.
    pub fn put(&mut self, kind: EntityKind, id: String, doc: Value) {
        self.writes.insert((kind, id), doc);
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Value> {
        self.writes.get(&(kind, id.to_string()))
    }

    /// Staged documents of `kind`, in first-write order.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &Value)> {
        self.writes
            .iter()
            .filter(move |((k, _), _)| *k == kind)
            .map(|((_, id), doc)| (id.as_str(), doc))
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
            .into_iter()
            .map(|((kind, id), doc)| Write { kind, id, doc })
            .collect()
    }
}

// ─── Db ───────────────────────────────────────────────────────────────────────

/// Typed access to an [`EntityStore`].
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn EntityStore>,
}

impl Db {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn load<E: Entity>(&self, id: &str) -> Result<Option<E>, IndexerError> {
        match self.store.get(E::KIND, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn find<E: Entity>(&self, field: &str, value: &str) -> Result<Vec<E>, IndexerError> {
        self.store
            .find(E::KIND, field, value)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(IndexerError::from))
            .collect()
    }

    pub async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool, IndexerError> {
        Ok(self.store.get(kind, id).await?.is_some())
    }

    /// Persist one event's effects as a single batch.
    pub async fn commit(&self, effects: Effects) -> Result<(), IndexerError> {
        if effects.is_empty() {
            return Ok(());
        }
        self.store.upsert_batch(effects.into_writes()).await
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

/// In-memory entity store for tests and dry runs.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<EntityKind, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents of `kind`, ordered by id.
    pub fn all(&self, kind: EntityKind) -> Vec<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Value>, IndexerError> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .get(&kind)
            .and_then(|m| m.get(id))
            .cloned())
    }

    async fn find(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, IndexerError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .get(&kind)
            .map(|m| {
                m.values()
                    .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_batch(&self, writes: Vec<Write>) -> Result<(), IndexerError> {
        let mut docs = self.docs.lock().unwrap();
        for w in writes {
            docs.entry(w.kind).or_default().insert(w.id, w.doc);
        }
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, IndexerError> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .get(&kind)
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Account;

    fn account(id: &str) -> Account {
        Account {
            id: id.into(),
            chain_id: 1,
            address: id.split(':').nth(1).unwrap_or_default().into(),
        }
    }

    #[test]
    fn later_writes_win_and_keep_first_position() {
        let mut fx = Effects::new();
        fx.put(EntityKind::Account, "a".into(), serde_json::json!(1));
        fx.put(EntityKind::Account, "b".into(), serde_json::json!(2));
        fx.put(EntityKind::Account, "a".into(), serde_json::json!(3));
        let writes = fx.into_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].id, "a");
        assert_eq!(writes[0].doc, serde_json::json!(3));
    }

    #[tokio::test]
    async fn typed_load_and_find() {
        let db = Db::new(Arc::new(MemoryStore::new()));
        let mut fx = Effects::new();
        for a in [account("1:0xa"), account("1:0xb")] {
            fx.put(EntityKind::Account, a.id.clone(), serde_json::to_value(&a).unwrap());
        }
        db.commit(fx).await.unwrap();

        let a: Account = db.load("1:0xa").await.unwrap().unwrap();
        assert_eq!(a.address, "0xa");
        assert!(db.load::<Account>("1:0xc").await.unwrap().is_none());

        let found: Vec<Account> = db.find("address", "0xb").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(db.store().count(EntityKind::Account).await.unwrap(), 2);
    }
}
