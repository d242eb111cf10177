//! Record stores: one persisted record list per scope.
//!
//! Stores replace a scope's list wholesale on every write, so a reader never
//! observes a half-applied change.

pub mod connection;
pub mod file;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StoreConfig, StoreKind};
use crate::error::{AppError, Result};
use crate::models::{AttendanceRecord, ScopeKey};

pub use connection::{connect, ensure_schema, get_version, test_connection};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence for per-scope record lists.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Records stored for `key`; an unknown scope yields an empty list.
    async fn get(&self, key: &ScopeKey) -> Result<Vec<AttendanceRecord>>;

    /// Replace everything stored for `key` with `records`.
    async fn put(&self, key: &ScopeKey, records: Vec<AttendanceRecord>) -> Result<()>;

    /// Group ids known to the store, sorted.
    async fn groups(&self) -> Result<Vec<String>>;
}

/// Open the local store selected in the config.
///
/// Fails for [`StoreKind::Http`], which keeps its records on the server.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn AttendanceStore>> {
    let store: Arc<dyn AttendanceStore> = match config.kind {
        StoreKind::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::File => {
            let path = config.resolved_file_path();
            info!("Using file store at {}", path.display());
            Arc::new(JsonFileStore::open(path)?)
        }
        StoreKind::Postgres => {
            let conn = connect(&config.database.connection_string()).await?;
            test_connection(&conn).await?;
            if let Ok(version) = get_version(&conn).await {
                info!("PostgreSQL: {}", version);
            }
            ensure_schema(&conn).await?;
            Arc::new(PgStore::new(conn))
        }
        StoreKind::Http => {
            return Err(AppError::config("the http store has no local record store"));
        }
    };
    Ok(store)
}
