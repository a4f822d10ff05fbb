//! Byte-budgeted LRU cache of node outputs, keyed by `(node_id, sub_key)`.
//!
//! Backed by `lru::LruCache` for recency bookkeeping (its internal capacity
//! is set effectively unbounded — entry count is not the limiting factor
//! here, memory is), guarded by a single `parking_lot::RwLock`, with a side
//! counter of bytes in use so the ceiling can be checked in O(1).

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::types::{CacheKey, NodeId, SizedPayload};

/// 64 MiB, the implementation-defined default ceiling.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

pub struct CacheStatistics {
    pub size: usize,
    pub memory_usage: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_accesses: u64,
}

struct Inner<P> {
    entries: LruCache<CacheKey, P>,
    bytes_in_use: usize,
    hits: u64,
    misses: u64,
}

/// Thread-safe cache of payloads implementing [`SizedPayload`].
pub struct Cache<P: SizedPayload> {
    inner: RwLock<Inner<P>>,
    memory_limit: usize,
}

impl<P: SizedPayload> Cache<P> {
    pub fn new(memory_limit: usize) -> EngineResult<Self> {
        if memory_limit == 0 {
            return Err(EngineError::invalid_argument("cache memory_limit must be > 0"));
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(usize::MAX).unwrap()),
                bytes_in_use: 0,
                hits: 0,
                misses: 0,
            }),
            memory_limit,
        })
    }

    pub fn store(&self, key: CacheKey, value: P) -> EngineResult<()> {
        let size = value.payload_size();
        if size > self.memory_limit {
            return Err(EngineError::capacity_exceeded(format!(
                "payload of {size} bytes exceeds cache memory limit of {} bytes",
                self.memory_limit
            )));
        }
        let mut inner = self.inner.write();
        if let Some(old) = inner.entries.pop(&key) {
            inner.bytes_in_use -= old.payload_size();
        }
        while inner.bytes_in_use + size > self.memory_limit {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.bytes_in_use -= evicted.payload_size(),
                None => break,
            }
        }
        inner.bytes_in_use += size;
        inner.entries.put(key, value);
        Ok(())
    }

    /// Retrieval counts as an access (hit or miss) and updates recency.
    pub fn retrieve(&self, key: &CacheKey) -> Option<P> {
        let mut inner = self.inner.write();
        match inner.entries.get(key) {
            Some(v) => {
                let v = v.clone();
                inner.hits += 1;
                Some(v)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// `has` counts as an access and updates recency, same as `retrieve`,
    /// without cloning the payload out.
    pub fn has(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.write();
        let found = inner.entries.get(key).is_some();
        if found {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    pub fn invalidate_node(&self, node_id: &NodeId) {
        let mut inner = self.inner.write();
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| &k.node_id == node_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(v) = inner.entries.pop(&key) {
                inner.bytes_in_use -= v.payload_size();
            }
        }
    }

    pub fn invalidate_key(&self, key: &CacheKey) {
        let mut inner = self.inner.write();
        if let Some(v) = inner.entries.pop(key) {
            inner.bytes_in_use -= v.payload_size();
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.bytes_in_use = 0;
    }

    pub fn statistics(&self) -> CacheStatistics {
        let inner = self.inner.read();
        let total = inner.hits + inner.misses;
        CacheStatistics {
            size: inner.entries.len(),
            memory_usage: inner.bytes_in_use,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 { 0.0 } else { inner.hits as f64 / total as f64 },
            total_accesses: total,
        }
    }
}

impl<P: SizedPayload> Default for Cache<P> {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT).expect("default memory limit is always > 0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(node: &str, sub: &str) -> CacheKey {
        CacheKey::new(NodeId::new(node).unwrap(), sub).unwrap()
    }

    #[derive(Clone)]
    struct Blob(usize);
    impl SizedPayload for Blob {
        fn payload_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let c: Cache<Blob> = Cache::new(4096).unwrap();
        c.store(key("n1", "k1"), Blob(10)).unwrap();
        assert_eq!(c.retrieve(&key("n1", "k1")).map(|b| b.0), Some(10));
    }

    #[test]
    fn single_payload_over_limit_fails_capacity() {
        let c: Cache<Blob> = Cache::new(100).unwrap();
        let err = c.store(key("n1", "k1"), Blob(200)).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::CapacityExceeded);
    }

    #[test]
    fn lru_eviction_keeps_recently_used() {
        let c: Cache<Blob> = Cache::new(2048).unwrap();
        c.store(key("n1", "k1"), Blob(1024)).unwrap();
        c.store(key("n2", "k1"), Blob(1024)).unwrap();
        c.retrieve(&key("n1", "k1"));
        c.store(key("n3", "k1"), Blob(1024)).unwrap();
        assert!(c.has(&key("n1", "k1")));
        assert!(!c.has(&key("n2", "k1")));
        assert!(c.has(&key("n3", "k1")));
        assert!(c.statistics().memory_usage <= 2048);
    }

    #[test]
    fn hit_rate_tracks_accesses() {
        let c: Cache<Blob> = Cache::new(4096).unwrap();
        c.store(key("n1", "k1"), Blob(10)).unwrap();
        c.retrieve(&key("n1", "k1"));
        c.retrieve(&key("missing", "k1"));
        let stats = c.statistics();
        assert_eq!(stats.total_accesses, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalidate_node_removes_all_its_keys() {
        let c: Cache<Blob> = Cache::new(4096).unwrap();
        c.store(key("n1", "a"), Blob(10)).unwrap();
        c.store(key("n1", "b"), Blob(10)).unwrap();
        c.store(key("n2", "a"), Blob(10)).unwrap();
        c.invalidate_node(&NodeId::new("n1").unwrap());
        assert!(!c.has(&key("n1", "a")));
        assert!(!c.has(&key("n1", "b")));
        assert!(c.has(&key("n2", "a")));
    }

    #[test]
    fn zero_memory_limit_rejected() {
        let err = Cache::<Blob>::new(0).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidArgument);
    }

    #[test]
    fn restoring_existing_key_under_pressure_does_not_double_count_its_own_bytes() {
        let c: Cache<Blob> = Cache::new(2048).unwrap();
        c.store(key("a", "k1"), Blob(1024)).unwrap();
        c.store(key("b", "k1"), Blob(1024)).unwrap();
        // Re-store `a` larger: the stale `a` entry must be dropped from the
        // LRU before eviction runs, or `pop_lru` can evict it a second time
        // and `bytes_in_use` undercounts what the map actually holds.
        c.store(key("a", "k1"), Blob(1025)).unwrap();
        let stats = c.statistics();
        assert!(stats.memory_usage <= 2048, "memory_usage {} exceeds ceiling", stats.memory_usage);
        assert_eq!(c.retrieve(&key("a", "k1")).map(|b| b.0), Some(1025));
    }
}
