//! corkindex-storage: durable entity store backends for corkindex.
//!
//! Backends:
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - [`postgres`]: PostgreSQL via `sqlx` (`postgres` feature)
//!
//! Both keep every entity as a JSON document keyed by `(kind, id)` and
//! implement [`EntityStore`](corkindex_core::EntityStore) and
//! [`CheckpointStore`](corkindex_core::CheckpointStore). The in-memory store
//! lives in `corkindex-core`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};

/// Document fields that `find` may filter on are plain identifiers; they are
/// spliced into a JSON path, so anything else is rejected.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn check_field(field: &str) -> Result<(), corkindex_core::IndexerError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(corkindex_core::IndexerError::Storage(format!(
            "invalid document field '{field}'"
        )))
    }
}
