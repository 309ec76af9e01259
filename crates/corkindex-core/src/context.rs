//! Warm and apply contexts for the two-phase handler interface.
//!
//! The warm phase only reads: lookups go straight to the store and every
//! result (hit or miss) is cached, so independent reads can be issued together
//! with `futures::try_join!`. The apply phase reads through its own pending
//! writes, then the warm cache, then the store, and collects every write into
//! [`Effects`] that the engine commits as one batch.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::ChainSettings;
use crate::error::IndexerError;
use crate::model::{Entity, EntityKind};
use crate::store::{Db, Effects};
use crate::types::ChainId;

type DocKey = (EntityKind, String);
type FindKey = (EntityKind, String, String);

/// Everything the warm phase read.
#[derive(Debug, Default)]
pub struct WarmCache {
    docs: HashMap<DocKey, Option<Value>>,
    finds: HashMap<FindKey, Vec<Value>>,
}

impl WarmCache {
    pub fn len(&self) -> usize {
        self.docs.len() + self.finds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty() && self.finds.is_empty()
    }
}

// ─── WarmContext ──────────────────────────────────────────────────────────────

/// Read-only prefetch context.
pub struct WarmContext {
    db: Db,
    chain: Arc<ChainSettings>,
    cache: Mutex<WarmCache>,
}

impl WarmContext {
    pub fn new(db: Db, chain: Arc<ChainSettings>) -> Self {
        Self {
            db,
            chain,
            cache: Mutex::new(WarmCache::default()),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id
    }

    pub fn chain(&self) -> &ChainSettings {
        &self.chain
    }

    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>, IndexerError> {
        let doc = self.db.store().get(E::KIND, id).await?;
        self.cache
            .lock()
            .unwrap()
            .docs
            .insert((E::KIND, id.to_string()), doc.clone());
        doc.map(serde_json::from_value)
            .transpose()
            .map_err(IndexerError::from)
    }

    pub async fn find<E: Entity>(&self, field: &str, value: &str) -> Result<Vec<E>, IndexerError> {
        let docs = self.db.store().find(E::KIND, field, value).await?;
        self.cache.lock().unwrap().finds.insert(
            (E::KIND, field.to_string(), value.to_string()),
            docs.clone(),
        );
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(IndexerError::from))
            .collect()
    }

    pub fn into_cache(self) -> WarmCache {
        self.cache.into_inner().unwrap_or_default()
    }

    /// Hand everything warm read to the apply phase.
    pub fn into_apply(self) -> ApplyContext {
        let db = self.db.clone();
        let chain = self.chain.clone();
        ApplyContext::new(db, chain, self.into_cache())
    }
}

// ─── ApplyContext ─────────────────────────────────────────────────────────────

/// Mutation context. Writes are visible to later reads within the same event.
pub struct ApplyContext {
    db: Db,
    chain: Arc<ChainSettings>,
    cache: WarmCache,
    pending: Effects,
}

impl ApplyContext {
    pub fn new(db: Db, chain: Arc<ChainSettings>, cache: WarmCache) -> Self {
        Self {
            db,
            chain,
            cache,
            pending: Effects::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id
    }

    pub fn chain(&self) -> &ChainSettings {
        &self.chain
    }

    /// Read-through lookup: pending writes, warm cache, then the store.
    pub async fn get<E: Entity>(&mut self, id: &str) -> Result<Option<E>, IndexerError> {
        if let Some(doc) = self.pending.get(E::KIND, id) {
            return Ok(Some(serde_json::from_value(doc.clone())?));
        }
        let key = (E::KIND, id.to_string());
        let doc = match self.cache.docs.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let doc = self.db.store().get(E::KIND, id).await?;
                self.cache.docs.insert(key, doc.clone());
                doc
            }
        };
        doc.map(serde_json::from_value)
            .transpose()
            .map_err(IndexerError::from)
    }

    /// Field query merged with this event's pending writes, ordered by id.
    pub async fn find<E: Entity>(&mut self, field: &str, value: &str) -> Result<Vec<E>, IndexerError> {
        let key = (E::KIND, field.to_string(), value.to_string());
        let base = match self.cache.finds.get(&key) {
            Some(docs) => docs.clone(),
            None => {
                let docs = self.db.store().find(E::KIND, field, value).await?;
                self.cache.finds.insert(key, docs.clone());
                docs
            }
        };

        let mut merged: BTreeMap<String, Value> = base
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get("id")?.as_str()?.to_string();
                Some((id, doc))
            })
            .collect();
        for (id, doc) in self.pending.of_kind(E::KIND) {
            if doc.get(field).and_then(Value::as_str) == Some(value) {
                merged.insert(id.to_string(), doc.clone());
            } else {
                merged.remove(id);
            }
        }
        merged
            .into_values()
            .map(|d| serde_json::from_value(d).map_err(IndexerError::from))
            .collect()
    }

    /// Stage an upsert. Visible to subsequent reads in this context.
    pub fn set<E: Entity>(&mut self, entity: &E) -> Result<(), IndexerError> {
        let doc = serde_json::to_value(entity)?;
        self.pending.put(E::KIND, entity.id().to_string(), doc);
        Ok(())
    }

    pub fn pending(&self) -> &Effects {
        &self.pending
    }

    pub fn into_effects(self) -> Effects {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Account;
    use crate::store::MemoryStore;

    fn acct(addr: &str) -> Account {
        Account {
            id: format!("1:{addr}"),
            chain_id: 1,
            address: addr.into(),
        }
    }

    fn setup() -> (Db, Arc<ChainSettings>) {
        (
            Db::new(Arc::new(MemoryStore::new())),
            Arc::new(ChainSettings::new(1)),
        )
    }

    #[tokio::test]
    async fn warm_reads_are_cached_for_apply() {
        let (db, chain) = setup();
        let mut fx = Effects::new();
        fx.put(EntityKind::Account, "1:0xa".into(), serde_json::to_value(acct("0xa")).unwrap());
        db.commit(fx).await.unwrap();

        let warm = WarmContext::new(db.clone(), chain.clone());
        let (a, b) = futures::try_join!(warm.get::<Account>("1:0xa"), warm.get::<Account>("1:0xb"))
            .unwrap();
        assert!(a.is_some());
        assert!(b.is_none());
        let cache = warm.into_cache();
        assert_eq!(cache.len(), 2);

        let mut apply = ApplyContext::new(db, chain, cache);
        assert!(apply.get::<Account>("1:0xa").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn apply_sees_its_own_writes() {
        let (db, chain) = setup();
        let mut apply = ApplyContext::new(db.clone(), chain, WarmCache::default());
        apply.set(&acct("0xa")).unwrap();
        let got: Account = apply.get("1:0xa").await.unwrap().unwrap();
        assert_eq!(got.address, "0xa");

        let found: Vec<Account> = apply.find("address", "0xa").await.unwrap();
        assert_eq!(found.len(), 1);

        // nothing reaches the store until commit
        assert!(db.load::<Account>("1:0xa").await.unwrap().is_none());
        db.commit(apply.into_effects()).await.unwrap();
        assert!(db.load::<Account>("1:0xa").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn find_drops_rows_whose_pending_version_moved_away() {
        let (db, chain) = setup();
        let mut fx = Effects::new();
        fx.put(EntityKind::Account, "1:0xa".into(), serde_json::to_value(acct("0xa")).unwrap());
        db.commit(fx).await.unwrap();

        let mut apply = ApplyContext::new(db, chain, WarmCache::default());
        let mut moved = acct("0xa");
        moved.address = "0xz".into();
        apply.set(&moved).unwrap();
        let found: Vec<Account> = apply.find("address", "0xa").await.unwrap();
        assert!(found.is_empty());
    }
}
