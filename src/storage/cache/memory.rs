//! In-process cache backend.
//!
//! An LRU map of encoded payloads with a per-entry expiration. Expired
//! entries are dropped lazily when read.

use crate::storage::sqlite::acquire_lock;
use crate::storage::traits::CacheBackend;
use crate::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process LRU cache with per-entry TTL.
///
/// `LruCache::get` promotes entries, so reads take the same exclusive lock
/// as writes.
pub struct MemoryCacheBackend {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCacheBackend {
    /// Creates a cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries currently held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.entries).len()
    }

    /// Returns true if the cache holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = acquire_lock(&self.entries);
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_live(Instant::now()) => {
                return Ok(Some(entry.value.clone()));
            },
            Some(_) => {},
        }
        entries.pop(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: Instant::now().checked_add(ttl),
        };
        acquire_lock(&self.entries).put(key.to_string(), entry);
        Ok(())
    }

    fn delete_multi(&self, keys: &[String]) -> Result<()> {
        let mut entries = acquire_lock(&self.entries);
        for key in keys {
            entries.pop(key.as_str());
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        acquire_lock(&self.entries).clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_set_get() {
        let cache = MemoryCacheBackend::new(10);
        assert!(cache.get("k").unwrap().is_none());
        cache.set("k", b"value", HOUR).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"value"[..]));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = MemoryCacheBackend::new(10);
        cache.set("k", b"v", Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCacheBackend::new(2);
        cache.set("a", b"1", HOUR).unwrap();
        cache.set("b", b"2", HOUR).unwrap();
        let _ = cache.get("a").unwrap();
        cache.set("c", b"3", HOUR).unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
    }

    #[test]
    fn test_delete_multi_and_flush() {
        let cache = MemoryCacheBackend::new(10);
        for key in ["a", "b", "c"] {
            cache.set(key, b"x", HOUR).unwrap();
        }
        cache
            .delete_multi(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert!(cache.get("a").unwrap().is_none());
        assert_eq!(cache.len(), 2);

        cache.flush().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let cache = MemoryCacheBackend::new(10);
        cache.set("k", b"v", Duration::MAX).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache = MemoryCacheBackend::new(0);
        cache.set("a", b"1", HOUR).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
