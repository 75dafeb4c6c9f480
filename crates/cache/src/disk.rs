//! Disk-backed L3 tier.
//!
//! One JSON file per entry plus an `index.json` mapping cache keys to file
//! stems. Entries embed their TTL and source checksum so the tier can be
//! read cold after a restart. Anything unreadable or corrupt is treated as
//! a miss and removed — never a fatal error.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlprompt_core::hash::short_sha256;
use sqlprompt_core::CacheError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// On-disk representation of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry<V> {
    created_at_ms: i64,
    ttl_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    payload: V,
}

/// Result of a disk lookup that found a readable entry.
#[derive(Debug)]
pub enum DiskHit<V> {
    /// Within TTL. Carries the stored source checksum for validation and
    /// the TTL still left, so promotion into memory keeps the same deadline.
    Fresh {
        value: V,
        checksum: Option<String>,
        ttl_remaining: std::time::Duration,
    },
    /// TTL has lapsed. Only served by explicit stale-fallback reads.
    Expired { value: V },
}

pub struct DiskTier<V> {
    dir: PathBuf,
    index: Mutex<HashMap<String, String>>,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> DiskTier<V> {
    /// Open (or create) the disk tier at `dir`, loading the existing index.
    pub fn new(dir: PathBuf) -> Self {
        let index = Self::load_index(&dir);
        debug!(dir = %dir.display(), entries = index.len(), "Disk cache tier opened");
        Self {
            dir,
            index: Mutex::new(index),
            _marker: std::marker::PhantomData,
        }
    }

    fn index_path(dir: &PathBuf) -> PathBuf {
        dir.join("index.json")
    }

    fn load_index(dir: &PathBuf) -> HashMap<String, String> {
        let content = match std::fs::read_to_string(Self::index_path(dir)) {
            Ok(c) => c,
            Err(_) => return HashMap::new(), // No index yet — start empty
        };
        match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Could not parse disk cache index, starting empty");
                HashMap::new()
            }
        }
    }

    fn save_index(&self) -> Result<(), CacheError> {
        let snapshot = {
            let index = self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            serde_json::to_string(&*index)
                .map_err(|e| CacheError::Serialization(e.to_string()))?
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io(e.to_string()))?;
        std::fs::write(Self::index_path(&self.dir), snapshot)
            .map_err(|e| CacheError::Io(e.to_string()))
    }

    fn entry_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.json"))
    }

    /// Persist an entry. Write-back target for L2 evictions.
    pub fn store(
        &self,
        key: &str,
        value: &V,
        ttl: std::time::Duration,
        checksum: Option<String>,
    ) -> Result<(), CacheError> {
        let entry = DiskEntry {
            created_at_ms: Utc::now().timestamp_millis(),
            ttl_ms: ttl.as_millis() as u64,
            checksum,
            payload: value,
        };
        let json =
            serde_json::to_string(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io(e.to_string()))?;
        let stem = short_sha256(key);
        std::fs::write(self.entry_path(&stem), json).map_err(|e| CacheError::Io(e.to_string()))?;

        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), stem);
        self.save_index()
    }

    /// Look up an entry. Corrupt files are evicted and reported as a miss.
    pub fn load(&self, key: &str) -> Option<DiskHit<V>> {
        let stem = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let path = self.entry_path(&stem);

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                // File vanished out from under the index.
                self.remove(key);
                return None;
            }
        };

        let entry: DiskEntry<V> = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "Corrupt disk cache entry, evicting");
                self.remove(key);
                return None;
            }
        };

        let age_ms = Utc::now()
            .timestamp_millis()
            .saturating_sub(entry.created_at_ms);
        if age_ms > entry.ttl_ms as i64 {
            Some(DiskHit::Expired {
                value: entry.payload,
            })
        } else {
            let remaining = entry.ttl_ms.saturating_sub(age_ms.max(0) as u64);
            Some(DiskHit::Fresh {
                value: entry.payload,
                checksum: entry.checksum,
                ttl_remaining: std::time::Duration::from_millis(remaining),
            })
        }
    }

    /// Remove an entry. Returns whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        let stem = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        if let Some(stem) = stem {
            let _ = std::fs::remove_file(self.entry_path(&stem));
            if let Err(e) = self.save_index() {
                warn!(key, error = %e, "Could not persist disk cache index after removal");
            }
            true
        } else {
            false
        }
    }

    /// Delete expired entries. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let keys: Vec<String> = self
            .index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        let mut pruned = 0;
        for key in keys {
            if matches!(self.load(&key), Some(DiskHit::Expired { .. })) {
                self.remove(&key);
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, "Pruned expired disk cache entries");
        }
        pruned
    }

    pub fn clear(&self) {
        let stems: Vec<String> = {
            let mut index = self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let stems = index.values().cloned().collect();
            index.clear();
            stems
        };
        for stem in stems {
            let _ = std::fs::remove_file(self.entry_path(&stem));
        }
        if let Err(e) = self.save_index() {
            warn!(error = %e, "Could not persist disk cache index after clear");
        }
    }

    pub fn len(&self) -> usize {
        self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
