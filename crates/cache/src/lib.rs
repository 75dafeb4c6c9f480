//! Multi-level cache: two in-memory tiers over an optional disk tier.
//!
//! Reads walk L1 → L2 → L3. A disk hit moves straight into L2 on its first
//! read rather than after the promotion threshold: the read already paid the
//! disk cost, so the threshold gates only the L2 → L1 step. Writes land in
//! L1; tier overflow demotes the least-recently-used entry one level down,
//! with L2 overflow written back to disk. The combined L1+L2 byte ceiling is
//! enforced after every insert, whether from a write or a read-side
//! promotion. Expired and checksum-mismatched entries are evicted on read
//! and count as misses.

mod disk;
mod entry;
mod locks;

pub use entry::{CacheStats, Tier};

use disk::{DiskHit, DiskTier};
use entry::{CacheEntry, StatCounters};
use locks::KeyLocks;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Tier sizing and promotion knobs.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub l1_max_entries: usize,
    pub l2_max_entries: usize,
    /// Combined byte ceiling across L1 and L2.
    pub max_memory_bytes: usize,
    /// Hits required before an L2 entry moves up to L1.
    pub promotion_threshold: u32,
    /// Disk tier directory. `None` disables L3.
    pub disk_dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_max_entries: 50,
            l2_max_entries: 200,
            max_memory_bytes: 100 * 1024 * 1024,
            promotion_threshold: 2,
            disk_dir: None,
        }
    }
}

type TierMap<V> = HashMap<String, CacheEntry<V>>;

pub struct MultiLevelCache<V> {
    l1: RwLock<TierMap<V>>,
    l2: RwLock<TierMap<V>>,
    disk: Option<DiskTier<V>>,
    locks: KeyLocks,
    counters: StatCounters,
    seq: AtomicU64,
    settings: CacheSettings,
}

impl<V> MultiLevelCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(settings: CacheSettings) -> Self {
        let disk = settings.disk_dir.clone().map(DiskTier::new);
        Self {
            l1: RwLock::new(HashMap::new()),
            l2: RwLock::new(HashMap::new()),
            disk,
            locks: KeyLocks::new(),
            counters: StatCounters::default(),
            seq: AtomicU64::new(0),
            settings,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a value, walking the tiers top-down.
    pub async fn get(&self, key: &str) -> Option<V> {
        let _guard = self.locks.acquire(key).await;
        self.get_inner(key, None).await
    }

    /// Like [`get`](Self::get), but the entry must carry `expected_checksum`.
    /// A mismatch evicts the key from every tier.
    pub async fn get_validated(&self, key: &str, expected_checksum: &str) -> Option<V> {
        let _guard = self.locks.acquire(key).await;
        self.get_inner(key, Some(expected_checksum)).await
    }

    async fn get_inner(&self, key: &str, expected: Option<&str>) -> Option<V> {
        let seq = self.next_seq();

        // L1
        {
            let mut l1 = self.l1.write().await;
            if let Some(e) = l1.get_mut(key) {
                if e.is_expired() {
                    if let Some(e) = l1.remove(key) {
                        // Kept on disk so stale-fallback reads can still use it.
                        self.write_back(key, &e);
                    }
                    self.counters.record_miss();
                    return None;
                }
                if checksum_mismatch(e.checksum.as_deref(), expected) {
                    drop(l1);
                    self.purge(key).await;
                    self.counters.record_invalidation();
                    self.counters.record_miss();
                    return None;
                }
                e.touch(seq);
                self.counters.record_hit();
                return Some(e.value.clone());
            }
        }

        // L2
        {
            let mut l1 = self.l1.write().await;
            let mut l2 = self.l2.write().await;
            if let Some(e) = l2.get_mut(key) {
                if e.is_expired() {
                    if let Some(e) = l2.remove(key) {
                        self.write_back(key, &e);
                    }
                    self.counters.record_miss();
                    return None;
                }
                if checksum_mismatch(e.checksum.as_deref(), expected) {
                    drop(l1);
                    drop(l2);
                    self.purge(key).await;
                    self.counters.record_invalidation();
                    self.counters.record_miss();
                    return None;
                }
                e.touch(seq);
                let value = e.value.clone();
                if e.hits >= self.settings.promotion_threshold {
                    if let Some(e) = l2.remove(key) {
                        debug!(key, "Promoting cache entry L2 -> L1");
                        self.insert_l1(&mut l1, &mut l2, key, e);
                        self.enforce_memory_ceiling(&mut l1, &mut l2);
                    }
                }
                self.counters.record_hit();
                return Some(value);
            }
        }

        // L3
        if let Some(disk) = &self.disk {
            match disk.load(key) {
                Some(DiskHit::Fresh {
                    value,
                    checksum,
                    ttl_remaining,
                }) => {
                    if checksum_mismatch(checksum.as_deref(), expected) {
                        disk.remove(key);
                        self.counters.record_invalidation();
                        self.counters.record_miss();
                        return None;
                    }
                    // A disk hit is warm again: move it into L2.
                    let size = estimated_size(&value);
                    let entry = CacheEntry {
                        value: value.clone(),
                        created_at: Instant::now(),
                        ttl: ttl_remaining,
                        checksum,
                        hits: 1,
                        last_access: seq,
                        size_bytes: size,
                    };
                    let mut l1 = self.l1.write().await;
                    let mut l2 = self.l2.write().await;
                    debug!(key, "Promoting cache entry L3 -> L2");
                    self.insert_l2(&mut l2, key.to_string(), entry);
                    self.enforce_memory_ceiling(&mut l1, &mut l2);
                    self.counters.record_hit();
                    return Some(value);
                }
                Some(DiskHit::Expired { .. }) => {
                    // Left in place for get_stale.
                    self.counters.record_miss();
                    return None;
                }
                None => {}
            }
        }

        self.counters.record_miss();
        None
    }

    /// Best-effort read that ignores TTL. Serves the degraded path when the
    /// live source is unreachable and a fresh fill fails.
    pub async fn get_stale(&self, key: &str) -> Option<V> {
        let _guard = self.locks.acquire(key).await;
        if let Some(e) = self.l1.read().await.get(key) {
            return Some(e.value.clone());
        }
        if let Some(e) = self.l2.read().await.get(key) {
            return Some(e.value.clone());
        }
        match self.disk.as_ref()?.load(key)? {
            DiskHit::Fresh { value, .. } | DiskHit::Expired { value } => Some(value),
        }
    }

    /// Insert a value into L1, displacing older entries down the tiers.
    pub async fn put(&self, key: &str, value: V, ttl: Duration, checksum: Option<String>) {
        let _guard = self.locks.acquire(key).await;
        let seq = self.next_seq();
        let entry = CacheEntry {
            size_bytes: estimated_size(&value),
            value,
            created_at: Instant::now(),
            ttl,
            checksum,
            hits: 0,
            last_access: seq,
        };

        let mut l1 = self.l1.write().await;
        let mut l2 = self.l2.write().await;
        // A new value supersedes any copy in a lower tier.
        l2.remove(key);
        if let Some(disk) = &self.disk {
            disk.remove(key);
        }
        self.insert_l1(&mut l1, &mut l2, key, entry);
        self.enforce_memory_ceiling(&mut l1, &mut l2);
    }

    /// Drop a key from every tier.
    pub async fn invalidate(&self, key: &str) {
        let _guard = self.locks.acquire(key).await;
        if self.purge(key).await {
            self.counters.record_invalidation();
        }
    }

    /// Empty one tier, or all of them.
    pub async fn clear(&self, tier: Option<Tier>) {
        match tier {
            Some(Tier::L1) => self.l1.write().await.clear(),
            Some(Tier::L2) => self.l2.write().await.clear(),
            Some(Tier::L3) => {
                if let Some(disk) = &self.disk {
                    disk.clear();
                }
            }
            None => {
                self.l1.write().await.clear();
                self.l2.write().await.clear();
                if let Some(disk) = &self.disk {
                    disk.clear();
                }
            }
        }
    }

    /// Delete expired entries from the disk tier. Returns how many went.
    pub fn prune_disk(&self) -> usize {
        self.disk.as_ref().map_or(0, DiskTier::prune_expired)
    }

    pub async fn stats(&self) -> CacheStats {
        let l1 = self.l1.read().await;
        let l2 = self.l2.read().await;
        let memory_bytes = l1
            .values()
            .chain(l2.values())
            .map(|e| e.size_bytes)
            .sum();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            l1_items: l1.len(),
            l2_items: l2.len(),
            l3_items: self.disk.as_ref().map_or(0, DiskTier::len),
            memory_bytes,
        }
    }

    async fn purge(&self, key: &str) -> bool {
        let mut removed = self.l1.write().await.remove(key).is_some();
        removed |= self.l2.write().await.remove(key).is_some();
        if let Some(disk) = &self.disk {
            removed |= disk.remove(key);
        }
        removed
    }

    fn insert_l1(&self, l1: &mut TierMap<V>, l2: &mut TierMap<V>, key: &str, entry: CacheEntry<V>) {
        l1.insert(key.to_string(), entry);
        while l1.len() > self.settings.l1_max_entries {
            match pop_lru(l1) {
                Some((victim_key, victim)) => {
                    self.counters.record_eviction();
                    self.insert_l2(l2, victim_key, victim);
                }
                None => break,
            }
        }
    }

    fn insert_l2(&self, l2: &mut TierMap<V>, key: String, entry: CacheEntry<V>) {
        l2.insert(key, entry);
        while l2.len() > self.settings.l2_max_entries {
            match pop_lru(l2) {
                Some((victim_key, victim)) => {
                    self.counters.record_eviction();
                    self.write_back(&victim_key, &victim);
                }
                None => break,
            }
        }
    }

    /// Evict the globally least-recently-used memory entry until the
    /// combined L1+L2 footprint fits under the byte ceiling.
    fn enforce_memory_ceiling(&self, l1: &mut TierMap<V>, l2: &mut TierMap<V>) {
        loop {
            let total: usize = l1
                .values()
                .chain(l2.values())
                .map(|e| e.size_bytes)
                .sum();
            if total <= self.settings.max_memory_bytes {
                return;
            }
            let l1_lru = l1.values().map(|e| e.last_access).min();
            let l2_lru = l2.values().map(|e| e.last_access).min();
            let victim = match (l1_lru, l2_lru) {
                (Some(a), Some(b)) if a <= b => pop_lru(l1),
                (Some(_), Some(_)) => pop_lru(l2),
                (Some(_), None) => pop_lru(l1),
                (None, Some(_)) => pop_lru(l2),
                (None, None) => return,
            };
            match victim {
                Some((key, entry)) => {
                    debug!(key, size = entry.size_bytes, "Memory ceiling eviction");
                    self.counters.record_eviction();
                    self.write_back(&key, &entry);
                }
                None => return,
            }
        }
    }

    fn write_back(&self, key: &str, entry: &CacheEntry<V>) {
        if let Some(disk) = &self.disk {
            let remaining = entry.ttl.saturating_sub(entry.created_at.elapsed());
            if let Err(e) = disk.store(key, &entry.value, remaining, entry.checksum.clone()) {
                warn!(key, error = %e, "Write-back to disk tier failed");
            }
        }
    }
}

fn checksum_mismatch(stored: Option<&str>, expected: Option<&str>) -> bool {
    match (stored, expected) {
        (Some(s), Some(e)) => s != e,
        // Validated reads require a recorded checksum.
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn estimated_size<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value).map(|b| b.len()).unwrap_or(0)
}

fn pop_lru<V>(map: &mut TierMap<V>) -> Option<(String, CacheEntry<V>)> {
    let key = map
        .iter()
        .min_by_key(|(_, e)| e.last_access)
        .map(|(k, _)| k.clone())?;
    let entry = map.remove(&key)?;
    Some((key, entry))
}
