//! File-backed key-value store.
//!
//! The whole map lives in one JSON object on disk. Every write rewrites the
//! file through a temporary sibling and a rename, so a crash leaves either the
//! old or the new map.

use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::{KeyValueStore, SchedulerError};

/// Key-value store persisted as a JSON file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        }
        let entries = Self::load_from_disk(&path)?;
        tracing::debug!("opened key-value file {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<String, String>, SchedulerError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(path).map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| SchedulerError::Persistence(format!("{}: {e}", path.display())))
    }

    fn write_to_disk(&self, entries: &BTreeMap<String, String>) -> Result<(), SchedulerError> {
        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_string_pretty(entries).map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        fs::write(&tmp, body).map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SchedulerError::Persistence(e.to_string()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, SchedulerError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.write_to_disk(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.write_to_disk(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}
