//! In-memory store, used for demos and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::AttendanceStore;
use crate::error::{AppError, Result};
use crate::models::{AttendanceRecord, ScopeKey};

#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: Mutex<BTreeMap<ScopeKey, Vec<AttendanceRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with the given scopes.
    pub fn with_scopes(scopes: impl IntoIterator<Item = (ScopeKey, Vec<AttendanceRecord>)>) -> Self {
        Self {
            scopes: Mutex::new(scopes.into_iter().collect()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ScopeKey, Vec<AttendanceRecord>>>> {
        self.scopes
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn get(&self, key: &ScopeKey) -> Result<Vec<AttendanceRecord>> {
        Ok(self.lock()?.get(key).cloned().unwrap_or_default())
    }

    async fn put(&self, key: &ScopeKey, records: Vec<AttendanceRecord>) -> Result<()> {
        self.lock()?.insert(key.clone(), records);
        Ok(())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let groups: BTreeSet<String> = self.lock()?.keys().map(|key| key.group_id.clone()).collect();
        Ok(groups.into_iter().collect())
    }
}
