//! Cache entry bookkeeping and statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The three cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Hot in-memory tier.
    L1,
    /// Warm in-memory tier.
    L2,
    /// Disk-backed tier.
    L3,
}

/// An in-memory cache entry.
///
/// `last_access` is a monotonic sequence number, not a timestamp — two
/// entries touched in the same instant still have a defined LRU order.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    /// Checksum of the source state this entry was derived from.
    pub checksum: Option<String>,
    /// Hit counter; drives tier promotion.
    pub hits: u32,
    /// Monotonic access sequence, for LRU ordering.
    pub last_access: u64,
    /// Serialized size estimate, for the memory ceiling.
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    pub fn touch(&mut self, seq: u64) {
        self.hits += 1;
        self.last_access = seq;
    }
}

/// Hit/miss/eviction counters. Cheap to read concurrently.
#[derive(Debug, Default)]
pub struct StatCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub invalidations: AtomicU64,
}

impl StatCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of cache state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub l1_items: usize,
    pub l2_items: usize,
    pub l3_items: usize,
    pub memory_bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_not_expired() {
        let entry = CacheEntry {
            value: 1u32,
            created_at: Instant::now(),
            ttl: Duration::from_secs(60),
            checksum: None,
            hits: 0,
            last_access: 0,
            size_bytes: 4,
        };
        assert!(!entry.is_expired());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let entry = CacheEntry {
            value: 1u32,
            created_at: Instant::now() - Duration::from_millis(1),
            ttl: Duration::ZERO,
            checksum: None,
            hits: 0,
            last_access: 0,
            size_bytes: 4,
        };
        assert!(entry.is_expired());
    }

    #[test]
    fn touch_bumps_hits_and_order() {
        let mut entry = CacheEntry {
            value: (),
            created_at: Instant::now(),
            ttl: Duration::from_secs(60),
            checksum: None,
            hits: 0,
            last_access: 0,
            size_bytes: 0,
        };
        entry.touch(7);
        assert_eq!(entry.hits, 1);
        assert_eq!(entry.last_access, 7);
    }

    #[test]
    fn hit_rate_handles_empty() {
        let stats = CacheStats {
            hits: 0,
            misses: 0,
            evictions: 0,
            invalidations: 0,
            l1_items: 0,
            l2_items: 0,
            l3_items: 0,
            memory_bytes: 0,
        };
        assert_eq!(stats.hit_rate(), 0.0);
    }
}
