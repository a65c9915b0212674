//! Bounded outcome store.

use super::key::CacheKey;
use crate::types::Outcome;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    outcome: Outcome,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub expired: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    expired: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// LRU of completed outcomes with a fixed time-to-live.
///
/// One mutex guards the map, so a store may be shared by batches running
/// concurrently on the same engine.
pub struct OutcomeCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    stats: AtomicStats,
}

impl OutcomeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: AtomicStats::default(),
        }
    }

    /// Returns a copy of the cached outcome; expired entries are dropped.
    pub fn get(&self, key: &CacheKey) -> Option<Outcome> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.outcome.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an outcome. Anything but `completed` is ignored.
    pub fn insert(&self, key: CacheKey, outcome: Outcome) -> bool {
        if !outcome.is_success() {
            return false;
        }
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(
                key,
                CacheEntry {
                    outcome,
                    created_at: Instant::now(),
                },
            );
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
}
