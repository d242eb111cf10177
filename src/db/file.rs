//! JSON file store.
//!
//! The whole file is rewritten synchronously on each `put`: the new content goes
//! to a sibling temp file which is then renamed over the old one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use super::AttendanceStore;
use crate::error::{AppError, Result};
use crate::models::{AttendanceRecord, ScopeKey, records_from_values};

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default, deserialize_with = "deserialize_scopes")]
    scopes: BTreeMap<String, Vec<AttendanceRecord>>,
}

/// Unreadable records are skipped per scope so one bad entry cannot lock the store.
fn deserialize_scopes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<AttendanceRecord>>, D::Error> {
    let raw: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, values)| (key, records_from_values(values)))
        .collect())
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreFile>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store; an unreadable
    /// one is an error so that existing data is never overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<StoreFile>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store file {} not found, starting empty", path.display());
                StoreFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let skipped = data
            .scopes
            .keys()
            .filter(|key| ScopeKey::parse_storage_key(key).is_none())
            .count();
        if skipped > 0 {
            warn!("{skipped} malformed scope keys in {}", path.display());
        }

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn write_file(&self, data: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for JsonFileStore {
    async fn get(&self, key: &ScopeKey) -> Result<Vec<AttendanceRecord>> {
        let data = self.data.lock().map_err(|_| AppError::store("file store lock poisoned"))?;
        let records = data.scopes.get(&key.as_storage_key()).cloned().unwrap_or_default();
        Ok(records.into_iter().map(AttendanceRecord::normalize).collect())
    }

    async fn put(&self, key: &ScopeKey, records: Vec<AttendanceRecord>) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| AppError::store("file store lock poisoned"))?;
        let previous = data.scopes.insert(key.as_storage_key(), records);

        if let Err(e) = self.write_file(&data) {
            // Keep memory in line with what is on disk.
            match previous {
                Some(previous) => data.scopes.insert(key.as_storage_key(), previous),
                None => data.scopes.remove(&key.as_storage_key()),
            };
            return Err(e);
        }

        debug!("persisted scope {key} to {}", self.path.display());
        Ok(())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let data = self.data.lock().map_err(|_| AppError::store("file store lock poisoned"))?;
        let groups: BTreeSet<String> = data
            .scopes
            .keys()
            .filter_map(|key| ScopeKey::parse_storage_key(key))
            .map(|key| key.group_id)
            .collect();
        Ok(groups.into_iter().collect())
    }
}
