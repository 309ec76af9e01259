//! corkindex-cork: Cork protocol bindings for the corkindex engine.
//!
//! Provides the typed parameters of every indexed event, one handler set per
//! contract family, and [`compose_dispatch_table`], which wires them into an
//! immutable [`DispatchTable`](corkindex_core::DispatchTable).
//!
//! ```no_run
//! use std::sync::Arc;
//! use corkindex_core::{Indexer, IndexerConfig, MemoryStore};
//!
//! # async fn run() -> Result<(), corkindex_core::IndexerError> {
//! let config = IndexerConfig::from_file("config/corkindex.yaml")?;
//! let table = corkindex_cork::compose_dispatch_table()?;
//! let indexer = Indexer::new(&config, table, Arc::new(MemoryStore::new()));
//! let _stats = indexer.replay(vec![]).await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod events;
pub mod handlers;

pub use dispatch::compose_dispatch_table;
