//! corkindex-core: incremental state reconstruction from decoded contract events.
//!
//! # Architecture
//!
//! ```text
//! RawEvent stream → Indexer (one sequential worker per chain)
//!                      ├── ContractDirectory  (static + dynamic contract bindings)
//!                      ├── DispatchTable      ((contract kind, event) → handler)
//!                      ├── EventHandler       (register → warm → apply)
//!                      │     ├── factory      (get-or-create entities)
//!                      │     ├── ledger       (balances, supply, reserves)
//!                      │     └── pricing      (price graph, USD valuation)
//!                      ├── CheckpointManager  (stream position)
//!                      └── EntityStore        (memory / SQLite / Postgres)
//! ```

pub mod amount;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod factory;
pub mod handler;
pub mod ids;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod pricing;
pub mod registration;
pub mod store;
pub mod types;

pub use amount::Amount;
pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use config::{ChainConfig, ChainSettings, ContractConfig, IndexerConfig, PriceFeedConfig};
pub use context::{ApplyContext, WarmContext};
pub use engine::{Indexer, Processed, RunStats, SkipReason};
pub use error::IndexerError;
pub use handler::{DispatchTable, DispatchTableBuilder, EventHandler, Outcome};
pub use logging::{init_tracing, LogConfig};
pub use model::{Entity, EntityKind, PoolType, TokenRole};
pub use registration::{ContractDirectory, Registrations};
pub use store::{Db, Effects, EntityStore, MemoryStore, Write};
pub use types::{Block, ChainId, ContractKind, Event, RawEvent};
