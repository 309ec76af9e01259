//! The indexer engine: routes each raw event through its handler and commits
//! the resulting effects.
//!
//! Per event the order is fixed:
//!
//! ```text
//! resolve contract kind → route → decode → register → duplicate guard
//!     → warm → apply → event record → commit
//! ```
//!
//! Registration runs before the duplicate guard so that replaying an already
//! applied prefix rebuilds the in-memory contract directory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
use crate::config::{ChainSettings, IndexerConfig};
use crate::context::WarmContext;
use crate::error::IndexerError;
use crate::handler::{DispatchTable, Outcome};
use crate::model::{EntityKind, EventRecord};
use crate::registration::{ContractDirectory, Registrations};
use crate::store::{Db, EntityStore};
use crate::types::{ChainId, RawEvent};

/// Why an event left no trace in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source address is not bound to a contract kind at this block.
    UnknownContract,
    /// The contract kind has no handler for this event name.
    NoRoute,
    /// Parameters did not match the event's schema.
    Decode(String),
    /// An event record with this id already exists.
    AlreadyApplied,
    /// The event is at or before the chain's resume checkpoint.
    BeforeCheckpoint,
    /// The handler found a referenced entity missing.
    MissingReference(String),
    /// The handler failed with a non-fatal error.
    Failed(String),
}

/// What [`Indexer::process`] did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Applied { writes: usize },
    Skipped(SkipReason),
}

/// Counters for one replay or run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub applied: u64,
    pub duplicates: u64,
    pub unrouted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub writes: u64,
}

impl RunStats {
    pub fn record(&mut self, processed: &Processed) {
        match processed {
            Processed::Applied { writes } => {
                self.applied += 1;
                self.writes += *writes as u64;
            }
            Processed::Skipped(SkipReason::AlreadyApplied | SkipReason::BeforeCheckpoint) => {
                self.duplicates += 1
            }
            Processed::Skipped(SkipReason::UnknownContract | SkipReason::NoRoute) => {
                self.unrouted += 1
            }
            Processed::Skipped(SkipReason::MissingReference(_)) => self.skipped += 1,
            Processed::Skipped(SkipReason::Decode(_) | SkipReason::Failed(_)) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.unrouted += other.unrouted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.writes += other.writes;
    }

    pub fn total(&self) -> u64 {
        self.applied + self.duplicates + self.unrouted + self.skipped + self.failed
    }
}

// ─── Indexer ──────────────────────────────────────────────────────────────────

/// Applies event streams to an [`EntityStore`].
pub struct Indexer {
    id: String,
    checkpoint_interval: u64,
    channel_capacity: usize,
    table: Arc<DispatchTable>,
    db: Db,
    directory: Mutex<ContractDirectory>,
    chains: HashMap<ChainId, Arc<ChainSettings>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    resume: Mutex<HashMap<ChainId, (u64, u32)>>,
}

impl Indexer {
    pub fn new(config: &IndexerConfig, table: DispatchTable, store: Arc<dyn EntityStore>) -> Self {
        let chains = config
            .chains
            .iter()
            .map(|c| (c.chain_id, Arc::new(ChainSettings::from_config(c))))
            .collect();
        Self {
            id: config.id.clone(),
            checkpoint_interval: config.checkpoint_interval,
            channel_capacity: config.channel_capacity,
            table: Arc::new(table),
            db: Db::new(store),
            directory: Mutex::new(ContractDirectory::from_config(config)),
            chains,
            checkpoints: None,
            resume: Mutex::new(HashMap::new()),
        }
    }

    /// Persist stream positions through `store`.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.table
    }

    /// Snapshot of the current contract directory.
    pub fn directory(&self) -> ContractDirectory {
        self.directory.lock().unwrap().clone()
    }

    /// Settings for `chain_id`; unconfigured chains get defaults.
    pub fn settings(&self, chain_id: ChainId) -> Arc<ChainSettings> {
        self.chains
            .get(&chain_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ChainSettings::new(chain_id)))
    }

    /// Load the saved checkpoint of every configured chain. Events at or
    /// before a loaded position only run their registration phase.
    pub async fn resume(&self) -> Result<Vec<Checkpoint>, IndexerError> {
        let Some(store) = &self.checkpoints else {
            return Ok(vec![]);
        };
        let mut chain_ids: Vec<ChainId> = self.chains.keys().copied().collect();
        chain_ids.sort_unstable();

        let mut loaded = Vec::new();
        for chain_id in chain_ids {
            if let Some(cp) = store.load(chain_id, &self.id).await? {
                info!(chain_id, block = cp.block_number, log_index = cp.log_index, "resuming from checkpoint");
                self.resume
                    .lock()
                    .unwrap()
                    .insert(chain_id, (cp.block_number, cp.log_index));
                loaded.push(cp);
            }
        }
        Ok(loaded)
    }

    fn checkpoint_manager(&self, chain_id: ChainId) -> Option<CheckpointManager> {
        self.checkpoints.as_ref().map(|store| {
            CheckpointManager::new(store.clone(), chain_id, self.id.clone(), self.checkpoint_interval)
        })
    }

    fn before_checkpoint(&self, raw: &RawEvent) -> bool {
        self.resume
            .lock()
            .unwrap()
            .get(&raw.chain_id)
            .is_some_and(|pos| raw.position() <= *pos)
    }

    /// Process one event. Only fatal errors are returned; everything scoped
    /// to the event is reported as [`Processed::Skipped`].
    pub async fn process(&self, raw: &RawEvent) -> Result<Processed, IndexerError> {
        let chain_id = raw.chain_id;
        let block = raw.block.number;
        let log_index = raw.log_index;

        let resolved = raw.contract.or_else(|| {
            self.directory
                .lock()
                .unwrap()
                .resolve(chain_id, &raw.src_address, block)
        });
        let Some(kind) = resolved else {
            debug!(chain_id, block, log_index, src = %raw.src_address, event = %raw.event, "no contract bound");
            return Ok(Processed::Skipped(SkipReason::UnknownContract));
        };

        let Some(handler) = self.table.route(kind, &raw.event) else {
            debug!(chain_id, block, log_index, contract = %kind, event = %raw.event, "no route");
            return Ok(Processed::Skipped(SkipReason::NoRoute));
        };

        let prepared = match handler.prepare(raw, kind) {
            Ok(p) => p,
            Err(e) => {
                error!(chain_id, block, log_index, contract = %kind, event = %raw.event, error = %e, "undecodable event");
                return Ok(Processed::Skipped(SkipReason::Decode(e.to_string())));
            }
        };

        let mut requests = Registrations::new();
        prepared.register(&mut requests);
        if !requests.is_empty() {
            self.directory
                .lock()
                .unwrap()
                .register(chain_id, block, &requests);
        }

        if self.before_checkpoint(raw) {
            return Ok(Processed::Skipped(SkipReason::BeforeCheckpoint));
        }
        let event_id = raw.event_id();
        if self.db.exists(EntityKind::EventRecord, &event_id).await? {
            debug!(chain_id, block, log_index, event = %raw.event, "already applied");
            return Ok(Processed::Skipped(SkipReason::AlreadyApplied));
        }

        let warm = WarmContext::new(self.db.clone(), self.settings(chain_id));
        let (outcome, mut ctx) = match prepared.run(warm).await {
            Ok(done) => done,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(chain_id, block, log_index, contract = %kind, event = %raw.event, handler = handler.name(), error = %e, "handler failed");
                return Ok(Processed::Skipped(SkipReason::Failed(e.to_string())));
            }
        };

        match outcome {
            Outcome::Skipped { reason } => {
                warn!(chain_id, block, log_index, contract = %kind, event = %raw.event, %reason, "event skipped");
                Ok(Processed::Skipped(SkipReason::MissingReference(reason)))
            }
            Outcome::Applied => {
                ctx.set(&EventRecord {
                    id: event_id,
                    chain_id,
                    contract: kind,
                    event: raw.event.clone(),
                    src_address: crate::ids::normalize(&raw.src_address),
                    block_number: block,
                    timestamp: raw.block.timestamp,
                    log_index,
                    params: raw.params.clone(),
                })?;
                let effects = ctx.into_effects();
                let writes = effects.len();
                self.db.commit(effects).await?;
                debug!(chain_id, block, log_index, contract = %kind, event = %raw.event, writes, "applied");
                Ok(Processed::Applied { writes })
            }
        }
    }

    /// Process `events` one at a time in the given order.
    pub async fn replay<I>(&self, events: I) -> Result<RunStats, IndexerError>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut stats = RunStats::default();
        let mut managers: HashMap<ChainId, CheckpointManager> = HashMap::new();

        for raw in events {
            let processed = self.process(&raw).await?;
            stats.record(&processed);
            if !managers.contains_key(&raw.chain_id) {
                if let Some(mgr) = self.checkpoint_manager(raw.chain_id) {
                    managers.insert(raw.chain_id, mgr);
                }
            }
            if let Some(mgr) = managers.get_mut(&raw.chain_id) {
                mgr.advance(raw.block.number, raw.log_index).await?;
            }
        }
        for mgr in managers.values() {
            mgr.force_save().await?;
        }
        info!(applied = stats.applied, duplicates = stats.duplicates, skipped = stats.skipped, failed = stats.failed, "replay finished");
        Ok(stats)
    }

    /// Process `events` with one sequential worker per chain; chains run
    /// concurrently. Input order is preserved within each chain.
    pub async fn run<I>(self: Arc<Self>, events: I) -> Result<RunStats, IndexerError>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut senders: HashMap<ChainId, mpsc::Sender<RawEvent>> = HashMap::new();
        let mut workers = Vec::new();

        for raw in events {
            let chain_id = raw.chain_id;
            let tx = senders.entry(chain_id).or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.channel_capacity);
                let indexer = self.clone();
                workers.push((chain_id, tokio::spawn(indexer.chain_worker(chain_id, rx))));
                tx
            });
            if tx.send(raw).await.is_err() {
                // the worker stopped on a fatal error; its result is collected below
                debug!(chain_id, "chain worker gone, dropping event");
            }
        }
        drop(senders);

        let mut stats = RunStats::default();
        let mut first_err = None;
        for (chain_id, handle) in workers {
            match handle.await {
                Ok(Ok(chain_stats)) => stats.merge(&chain_stats),
                Ok(Err(e)) => {
                    error!(chain_id, error = %e, "chain worker halted");
                    first_err.get_or_insert(e);
                }
                Err(join) => {
                    first_err.get_or_insert(IndexerError::Aborted {
                        reason: format!("chain {chain_id} worker: {join}"),
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn chain_worker(
        self: Arc<Self>,
        chain_id: ChainId,
        mut rx: mpsc::Receiver<RawEvent>,
    ) -> Result<RunStats, IndexerError> {
        let mut checkpoints = self.checkpoint_manager(chain_id);
        let mut stats = RunStats::default();
        let mut last: Option<(u64, u32)> = None;

        info!(chain_id, "chain worker started");
        while let Some(raw) = rx.recv().await {
            if last.is_some_and(|prev| raw.position() < prev) {
                warn!(chain_id, block = raw.block.number, log_index = raw.log_index, "event out of order");
            }
            last = Some(raw.position());

            let processed = match self.process(&raw).await {
                Ok(p) => p,
                Err(e) => {
                    if let Some(mgr) = &checkpoints {
                        mgr.force_save().await?;
                    }
                    return Err(e);
                }
            };
            stats.record(&processed);
            if let Some(mgr) = checkpoints.as_mut() {
                mgr.advance(raw.block.number, raw.log_index).await?;
            }
        }
        if let Some(mgr) = &checkpoints {
            mgr.force_save().await?;
        }
        info!(chain_id, applied = stats.applied, total = stats.total(), "chain worker finished");
        Ok(stats)
    }
}
