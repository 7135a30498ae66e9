//! Persistence for the long_term and archival tiers.
//!
//! Two backends ship with the engine:
//! - `InMemoryStore`: hash map, lost on restart
//! - `SqliteMemoryStore`: single-file SQLite database

mod memory;
mod retry;
pub mod similarity;
mod sqlite;

use std::sync::Arc;

pub use memory::InMemoryStore;
pub use retry::retry_on_conflict;
pub use sqlite::SqliteMemoryStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StrataResult;
use crate::traits::SharedStore;

/// Open the backend selected by `config`.
pub fn open_store(config: &StoreConfig) -> StrataResult<SharedStore> {
    let store: SharedStore = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Sqlite => {
            tracing::info!(path = %config.path.display(), "Opening SQLite memory store");
            Arc::new(SqliteMemoryStore::new(&config.path)?)
        }
    };
    Ok(store)
}
