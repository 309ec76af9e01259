//! Two-phase event handler trait + dispatch table.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::{ApplyContext, WarmContext};
use crate::error::IndexerError;
use crate::ids;
use crate::registration::Registrations;
use crate::types::{ContractKind, Event, RawEvent};

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// State was mutated; the engine writes the event record.
    Applied,
    /// A referenced entity was missing. Nothing is written.
    Skipped { reason: String },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// A handler for one `(contract kind, event name)` route.
///
/// The engine calls [`register`](Self::register), then [`warm`](Self::warm),
/// then [`apply`](Self::apply). Warm only reads (and should batch independent
/// reads); all mutation happens in apply.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Decoded event parameters.
    type Params: DeserializeOwned + Send + Sync + 'static;
    /// Whatever warm prefetched, handed to apply.
    type Loaded: Default + Send + 'static;

    /// Request dynamic contract registrations revealed by this event.
    fn register(&self, _event: &Event<Self::Params>, _out: &mut Registrations) {}

    async fn warm(
        &self,
        _event: &Event<Self::Params>,
        _ctx: &WarmContext,
    ) -> Result<Self::Loaded, IndexerError> {
        Ok(Default::default())
    }

    async fn apply(
        &self,
        event: &Event<Self::Params>,
        loaded: Self::Loaded,
        ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError>;

    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

// ─── Erasure ──────────────────────────────────────────────────────────────────

/// A routed event whose parameters decoded successfully.
#[async_trait]
pub trait PreparedEvent: Send + Sync {
    fn register(&self, out: &mut Registrations);

    /// Run warm, then apply against the context built from warm's cache.
    async fn run(&self, warm: WarmContext) -> Result<(Outcome, ApplyContext), IndexerError>;
}

/// Object-safe view of an [`EventHandler`].
pub trait DynHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `raw` into a typed event for this handler.
    fn prepare(&self, raw: &RawEvent, contract: ContractKind) -> Result<Box<dyn PreparedEvent>, IndexerError>;
}

struct Typed<H>(Arc<H>);

struct Prepared<H: EventHandler> {
    handler: Arc<H>,
    event: Event<H::Params>,
}

impl<H: EventHandler> DynHandler for Typed<H> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn prepare(&self, raw: &RawEvent, contract: ContractKind) -> Result<Box<dyn PreparedEvent>, IndexerError> {
        let params: H::Params =
            serde_json::from_value(raw.params.clone()).map_err(|e| IndexerError::Decode {
                contract: contract.to_string(),
                event: raw.event.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(Prepared {
            handler: self.0.clone(),
            event: Event {
                chain_id: raw.chain_id,
                block: raw.block,
                log_index: raw.log_index,
                src_address: ids::normalize(&raw.src_address),
                contract,
                name: raw.event.clone(),
                params,
            },
        }))
    }
}

impl<H: EventHandler> Prepared<H> {
    /// Attribute a non-fatal failure to the handler that raised it.
    fn failed(&self, err: IndexerError) -> IndexerError {
        if err.is_fatal() || matches!(err, IndexerError::Handler { .. }) {
            return err;
        }
        IndexerError::Handler {
            handler: self.handler.name().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl<H: EventHandler> PreparedEvent for Prepared<H> {
    fn register(&self, out: &mut Registrations) {
        self.handler.register(&self.event, out);
    }

    async fn run(&self, warm: WarmContext) -> Result<(Outcome, ApplyContext), IndexerError> {
        let loaded = self
            .handler
            .warm(&self.event, &warm)
            .await
            .map_err(|e| self.failed(e))?;
        let mut ctx = warm.into_apply();
        let outcome = self
            .handler
            .apply(&self.event, loaded, &mut ctx)
            .await
            .map_err(|e| self.failed(e))?;
        Ok((outcome, ctx))
    }
}

// ─── Record-only handler ──────────────────────────────────────────────────────

/// Handler for events that only produce the audit record.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordOnly;

#[async_trait]
impl EventHandler for RecordOnly {
    type Params = serde_json::Value;
    type Loaded = ();

    async fn apply(
        &self,
        _event: &Event<Self::Params>,
        _loaded: (),
        _ctx: &mut ApplyContext,
    ) -> Result<Outcome, IndexerError> {
        Ok(Outcome::Applied)
    }
}

// ─── Dispatch table ───────────────────────────────────────────────────────────

type RouteKey = (ContractKind, String);

/// Immutable `(contract kind, event name) → handler` routing.
pub struct DispatchTable {
    routes: HashMap<RouteKey, Arc<dyn DynHandler>>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    pub fn route(&self, kind: ContractKind, event: &str) -> Option<&Arc<dyn DynHandler>> {
        self.routes.get(&(kind, event.to_string()))
    }

    /// Every route as `(kind, event, handler name)`, sorted.
    pub fn routes(&self) -> Vec<(ContractKind, &str, &'static str)> {
        let sorted: BTreeMap<(ContractKind, &str), &'static str> = self
            .routes
            .iter()
            .map(|((kind, event), h)| ((*kind, event.as_str()), h.name()))
            .collect();
        sorted.into_iter().map(|((k, e), h)| (k, e, h)).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects routes; [`build`](Self::build) freezes them.
#[derive(Default)]
pub struct DispatchTableBuilder {
    routes: HashMap<RouteKey, Arc<dyn DynHandler>>,
    duplicates: Vec<String>,
}

impl DispatchTableBuilder {
    /// Route `kind.event` to `handler`.
    pub fn on<H: EventHandler>(self, kind: ContractKind, event: &str, handler: H) -> Self {
        self.on_shared(kind, event, Arc::new(handler))
    }

    /// Route `kind.event` to a handler shared with other routes.
    pub fn on_shared<H: EventHandler>(mut self, kind: ContractKind, event: &str, handler: Arc<H>) -> Self {
        let key = (kind, event.to_string());
        if self.routes.contains_key(&key) {
            self.duplicates.push(format!("{kind}.{event}"));
        } else {
            self.routes.insert(key, Arc::new(Typed(handler)));
        }
        self
    }

    /// Route every event in `events` on `kind` to [`RecordOnly`].
    pub fn record(mut self, kind: ContractKind, events: &[&str]) -> Self {
        for event in events {
            self = self.on(kind, event, RecordOnly);
        }
        self
    }

    pub fn build(self) -> Result<DispatchTable, IndexerError> {
        if !self.duplicates.is_empty() {
            return Err(IndexerError::Config(format!(
                "duplicate routes: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(DispatchTable {
            routes: self.routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainSettings;
    use crate::store::{Db, MemoryStore};
    use crate::types::Block;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Deserialize)]
    struct Ping {
        n: u32,
    }

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl EventHandler for Counter {
        type Params = Ping;
        type Loaded = u32;

        fn register(&self, event: &Event<Ping>, out: &mut Registrations) {
            if event.params.n > 10 {
                out.add(ContractKind::CorkPool, "0xnew");
            }
        }

        async fn warm(&self, event: &Event<Ping>, _ctx: &WarmContext) -> Result<u32, IndexerError> {
            Ok(event.params.n * 2)
        }

        async fn apply(&self, _e: &Event<Ping>, loaded: u32, _ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
            self.0.fetch_add(loaded, Ordering::Relaxed);
            Ok(Outcome::Applied)
        }
    }

    fn raw(event: &str, params: serde_json::Value) -> RawEvent {
        RawEvent {
            chain_id: 1,
            block: Block { number: 1, timestamp: 0 },
            log_index: 0,
            src_address: "0xABC".into(),
            event: event.into(),
            contract: None,
            params,
        }
    }

    #[tokio::test]
    async fn routes_decode_and_run_both_phases() {
        let count = Arc::new(AtomicU32::new(0));
        let table = DispatchTable::builder()
            .on(ContractKind::CorkConfig, "Ping", Counter(count.clone()))
            .build()
            .unwrap();
        assert!(table.route(ContractKind::CorkConfig, "Pong").is_none());
        assert!(table.route(ContractKind::CorkPool, "Ping").is_none());

        let handler = table.route(ContractKind::CorkConfig, "Ping").unwrap();
        let prepared = handler
            .prepare(&raw("Ping", serde_json::json!({ "n": 21 })), ContractKind::CorkConfig)
            .unwrap();
        let mut regs = Registrations::new();
        prepared.register(&mut regs);
        assert_eq!(regs.len(), 1);

        let warm = WarmContext::new(Db::new(Arc::new(MemoryStore::new())), Arc::new(ChainSettings::new(1)));
        let (outcome, _) = prepared.run(warm).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(count.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn decode_failure_names_the_route() {
        let table = DispatchTable::builder()
            .on(ContractKind::CorkConfig, "Ping", Counter(Arc::default()))
            .build()
            .unwrap();
        let handler = table.route(ContractKind::CorkConfig, "Ping").unwrap();
        let err = handler
            .prepare(&raw("Ping", serde_json::json!({})), ContractKind::CorkConfig)
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::Decode { ref event, .. } if event == "Ping"));
    }

    /// Fails in apply: a serde error for `n == 0`, a storage error otherwise.
    struct Broken;

    #[async_trait]
    impl EventHandler for Broken {
        type Params = Ping;
        type Loaded = ();

        async fn apply(&self, e: &Event<Ping>, _: (), _ctx: &mut ApplyContext) -> Result<Outcome, IndexerError> {
            match e.params.n {
                0 => Err(serde_json::from_str::<u32>("nope").unwrap_err().into()),
                _ => Err(IndexerError::Storage("disk full".into())),
            }
        }
    }

    async fn run_broken(n: u32) -> IndexerError {
        let table = DispatchTable::builder()
            .on(ContractKind::CorkConfig, "Ping", Broken)
            .build()
            .unwrap();
        let prepared = table
            .route(ContractKind::CorkConfig, "Ping")
            .unwrap()
            .prepare(&raw("Ping", serde_json::json!({ "n": n })), ContractKind::CorkConfig)
            .unwrap();
        let warm = WarmContext::new(Db::new(Arc::new(MemoryStore::new())), Arc::new(ChainSettings::new(1)));
        prepared.run(warm).await.err().unwrap()
    }

    #[tokio::test]
    async fn handler_failures_name_the_handler() {
        let err = run_broken(0).await;
        assert!(matches!(err, IndexerError::Handler { ref handler, .. } if handler == "Broken"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn fatal_errors_pass_through_unwrapped() {
        let err = run_broken(1).await;
        assert!(matches!(err, IndexerError::Storage(_)));
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let result = DispatchTable::builder()
            .record(ContractKind::CorkPool, &["Upgraded"])
            .record(ContractKind::CorkPool, &["Upgraded"])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn routes_are_listed_sorted() {
        let table = DispatchTable::builder()
            .record(ContractKind::CorkPool, &["Upgraded", "Initialized"])
            .record(ContractKind::CorkConfig, &["Paused"])
            .build()
            .unwrap();
        let routes = table.routes();
        assert_eq!(routes[0], (ContractKind::CorkConfig, "Paused", "RecordOnly"));
        assert_eq!(routes[1].1, "Initialized");
        assert_eq!(table.len(), 3);
    }
}
