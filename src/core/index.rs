//! Persisted index of the identifiers that make up each owner's chain.
//!
//! Layout in the key-value store:
//!
//! - `notification_index_<OWNER-UUID>` → JSON array of identifier strings
//! - `notification_meta_<OWNER-UUID>` → JSON [`ChainMeta`]
//! - `notification_index_global` → JSON array, union of all owner entries
//!
//! The global entry is a cache for outside readers. Everything in here derives
//! the union from the per-owner entries, so a stale cache never matters.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{KeyValueStore, SchedulerError};

const KEY_PREFIX: &str = "notification_index_";
const META_KEY_PREFIX: &str = "notification_meta_";
const GLOBAL_KEY: &str = "notification_index_global";

/// Timing of the chain last scheduled for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMeta {
    /// Fire instant of the first trigger.
    pub start: DateTime<Utc>,
    /// Seconds between triggers.
    pub spacing_secs: u32,
    /// Triggers in the chain.
    pub count: usize,
    /// When the chain was scheduled.
    pub created_at: DateTime<Utc>,
}

impl ChainMeta {
    /// Fire instant of the last trigger.
    pub fn last_fire(&self) -> DateTime<Utc> {
        let tail = self.count.saturating_sub(1) as i64 * i64::from(self.spacing_secs);
        self.start + chrono::Duration::seconds(tail)
    }
}

/// Per-owner identifier index over a [`KeyValueStore`].
pub struct NotificationIndex {
    kv: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write sequences touching the global cache.
    write_lock: Mutex<()>,
}

impl NotificationIndex {
    /// Index persisted in `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Overwrite the owner's identifiers. An empty list removes the entry.
    pub fn save(&self, owner: Uuid, identifiers: &[String]) -> Result<(), SchedulerError> {
        let _guard = self.write_lock.lock();
        self.write_entry(owner, identifiers)?;
        self.rebuild_global();
        Ok(())
    }

    /// Identifiers recorded for the owner; empty when absent or unreadable.
    pub fn load(&self, owner: Uuid) -> Vec<String> {
        self.read_list(&entry_key(owner))
    }

    /// Forget the owner's identifiers.
    pub fn clear(&self, owner: Uuid) -> Result<(), SchedulerError> {
        tracing::info!("clearing identifiers for owner {}", owner);
        self.save(owner, &[])
    }

    /// Drop specific identifiers from the owner's entry.
    pub fn remove_identifiers(
        &self,
        owner: Uuid,
        identifiers: &[String],
    ) -> Result<(), SchedulerError> {
        let _guard = self.write_lock.lock();
        let current = self.load(owner);
        let doomed: HashSet<&String> = identifiers.iter().collect();
        let remaining: Vec<String> = current
            .iter()
            .filter(|id| !doomed.contains(id))
            .cloned()
            .collect();
        if remaining.len() == current.len() {
            return Ok(());
        }
        tracing::info!(
            "removing {} identifiers from owner {} ({} remaining)",
            current.len() - remaining.len(),
            owner,
            remaining.len()
        );
        self.write_entry(owner, &remaining)?;
        self.rebuild_global();
        Ok(())
    }

    /// Owners with an identifier entry.
    pub fn tracked_owner_ids(&self) -> Vec<Uuid> {
        match self.kv.keys() {
            Ok(keys) => keys
                .iter()
                .filter(|k| k.as_str() != GLOBAL_KEY)
                .filter_map(|k| k.strip_prefix(KEY_PREFIX))
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect(),
            Err(e) => {
                tracing::warn!("failed to list index keys: {}", e);
                Vec::new()
            }
        }
    }

    /// Union of every owner's identifiers, first-seen order.
    pub fn all_pending_identifiers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for owner in self.tracked_owner_ids() {
            for id in self.load(owner) {
                if seen.insert(id.clone()) {
                    all.push(id);
                }
            }
        }
        all
    }

    /// Remove every entry, metadata included.
    pub fn clear_all(&self) -> Result<(), SchedulerError> {
        let _guard = self.write_lock.lock();
        let keys = self.kv.keys()?;
        let mut removed = 0usize;
        for key in keys
            .iter()
            .filter(|k| k.starts_with(KEY_PREFIX) || k.starts_with(META_KEY_PREFIX))
        {
            self.kv.remove(key)?;
            removed += 1;
        }
        tracing::info!("cleared {} index keys", removed);
        Ok(())
    }

    /// Persist chain timing for stale-chain cleanup.
    pub fn save_chain_meta(&self, owner: Uuid, meta: &ChainMeta) -> Result<(), SchedulerError> {
        let value = serde_json::to_string(meta)
            .map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        self.kv.set(&meta_key(owner), &value)
    }

    /// Chain timing, if recorded and readable.
    pub fn load_chain_meta(&self, owner: Uuid) -> Option<ChainMeta> {
        let key = meta_key(owner);
        let raw = match self.kv.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("failed to read chain meta for {}: {}", owner, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!("{}", parse_failure(&key, &e));
                None
            }
        }
    }

    /// Forget chain timing.
    pub fn clear_chain_meta(&self, owner: Uuid) -> Result<(), SchedulerError> {
        self.kv.remove(&meta_key(owner))
    }

    /// Replace the owner's record around a submission.
    ///
    /// The old record is cleared, `work` runs, then the identifiers from
    /// `expected` that `work` reports as submitted are saved. A crash in the
    /// middle leaves either no record or the new one, never a blend.
    pub async fn idempotent_reschedule<F, Fut>(
        &self,
        owner: Uuid,
        expected: &[String],
        work: F,
    ) -> Result<Vec<String>, SchedulerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Vec<String>>,
    {
        tracing::info!(
            "idempotent reschedule for owner {}: current={} expected={}",
            owner,
            self.load(owner).len(),
            expected.len()
        );
        self.clear(owner)?;

        let submitted: HashSet<String> = work().await.into_iter().collect();
        let committed: Vec<String> = expected
            .iter()
            .filter(|id| submitted.contains(*id))
            .cloned()
            .collect();

        self.save(owner, &committed)?;
        Ok(committed)
    }

    fn write_entry(&self, owner: Uuid, identifiers: &[String]) -> Result<(), SchedulerError> {
        let key = entry_key(owner);
        if identifiers.is_empty() {
            return self.kv.remove(&key);
        }
        let value = serde_json::to_string(identifiers)
            .map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        self.kv.set(&key, &value)
    }

    fn read_list(&self, key: &str) -> Vec<String> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("failed to read `{}`: {}", key, e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("{}", parse_failure(key, &e));
            Vec::new()
        })
    }

    /// Refresh the cached global union. Failures only leave the cache stale.
    fn rebuild_global(&self) {
        let all = self.all_pending_identifiers();
        let result = if all.is_empty() {
            self.kv.remove(GLOBAL_KEY)
        } else {
            serde_json::to_string(&all)
                .map_err(|e| SchedulerError::Persistence(e.to_string()))
                .and_then(|value| self.kv.set(GLOBAL_KEY, &value))
        };
        if let Err(e) = result {
            tracing::warn!("failed to update global index cache: {}", e);
        }
    }
}

fn entry_key(owner: Uuid) -> String {
    format!("{KEY_PREFIX}{}", owner.as_hyphenated().to_string().to_uppercase())
}

fn meta_key(owner: Uuid) -> String {
    format!("{META_KEY_PREFIX}{}", owner.as_hyphenated().to_string().to_uppercase())
}

fn parse_failure(key: &str, e: &serde_json::Error) -> SchedulerError {
    SchedulerError::IndexParseFailure {
        key: key.to_string(),
        reason: e.to_string(),
    }
}
