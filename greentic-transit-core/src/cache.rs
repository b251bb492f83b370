//! Cache strategies for decoded key policies.

use crate::errors::{Error, Result};
use crate::policy::KeyPolicy;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Persisted discriminant of a cache strategy.
///
/// Stored as an integer (`0` unbounded, `1` lru, `2` not implemented); any other
/// integer reads back as [`CacheType::NotImplemented`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum CacheType {
    SyncMap,
    Lru,
    NotImplemented,
}

impl CacheType {
    /// Name used on the configuration interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::SyncMap => "unlimited",
            CacheType::Lru => "lru",
            CacheType::NotImplemented => "unknown",
        }
    }

    /// Parse the configuration interface name; unknown names map to `NotImplemented`.
    pub fn parse(value: &str) -> Self {
        match value {
            "unlimited" => CacheType::SyncMap,
            "lru" => CacheType::Lru,
            _ => CacheType::NotImplemented,
        }
    }
}

impl From<u8> for CacheType {
    fn from(value: u8) -> Self {
        match value {
            0 => CacheType::SyncMap,
            1 => CacheType::Lru,
            _ => CacheType::NotImplemented,
        }
    }
}

impl From<CacheType> for u8 {
    fn from(value: CacheType) -> Self {
        match value {
            CacheType::SyncMap => 0,
            CacheType::Lru => 1,
            CacheType::NotImplemented => 2,
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unbounded concurrent map; never evicts on insert.
#[derive(Default)]
pub struct UnboundedCache {
    entries: DashMap<String, Arc<KeyPolicy>>,
}

/// Size-bounded cache evicting the least recently used policy on overflow.
///
/// Every hit moves the entry to the most-recent position, so recency is a strict
/// order and entries that were never touched again are evicted in insertion order.
pub struct BoundedLruCache {
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<String, Arc<KeyPolicy>>>,
}

impl BoundedLruCache {
    fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidConfiguration("lru cache capacity must be greater than zero".into())
        })?;
        Ok(Self {
            capacity,
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }
}

/// The active caching algorithm of a [`LockManager`](crate::manager::LockManager).
pub enum CacheStrategy {
    Unbounded(UnboundedCache),
    BoundedLru(BoundedLruCache),
}

impl CacheStrategy {
    pub fn unbounded() -> Self {
        CacheStrategy::Unbounded(UnboundedCache::default())
    }

    /// Build an LRU strategy; `capacity` must be greater than zero.
    pub fn lru(capacity: usize) -> Result<Self> {
        BoundedLruCache::new(capacity).map(CacheStrategy::BoundedLru)
    }

    pub fn cache_type(&self) -> CacheType {
        match self {
            CacheStrategy::Unbounded(_) => CacheType::SyncMap,
            CacheStrategy::BoundedLru(_) => CacheType::Lru,
        }
    }

    /// Maximum number of entries; 0 for the unbounded strategy.
    pub fn capacity(&self) -> usize {
        match self {
            CacheStrategy::Unbounded(_) => 0,
            CacheStrategy::BoundedLru(cache) => cache.capacity.get(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<KeyPolicy>> {
        match self {
            CacheStrategy::Unbounded(cache) => {
                cache.entries.get(name).map(|entry| entry.value().clone())
            }
            CacheStrategy::BoundedLru(cache) => cache.entries.lock().get(name).cloned(),
        }
    }

    /// Read without touching recency.
    pub fn peek(&self, name: &str) -> Option<Arc<KeyPolicy>> {
        match self {
            CacheStrategy::Unbounded(_) => self.get(name),
            CacheStrategy::BoundedLru(cache) => cache.entries.lock().peek(name).cloned(),
        }
    }

    /// Insert or replace `name`. Returns the name evicted to make room, if any.
    pub fn put(&self, name: String, policy: Arc<KeyPolicy>) -> Option<String> {
        match self {
            CacheStrategy::Unbounded(cache) => {
                cache.entries.insert(name, policy);
                None
            }
            CacheStrategy::BoundedLru(cache) => {
                let mut entries = cache.entries.lock();
                match entries.push(name, policy) {
                    Some((evicted, _)) if !entries.contains(&evicted) => Some(evicted),
                    _ => None,
                }
            }
        }
    }

    pub fn evict(&self, name: &str) -> Option<Arc<KeyPolicy>> {
        match self {
            CacheStrategy::Unbounded(cache) => cache.entries.remove(name).map(|(_, v)| v),
            CacheStrategy::BoundedLru(cache) => cache.entries.lock().pop(name),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CacheStrategy::Unbounded(cache) => cache.entries.len(),
            CacheStrategy::BoundedLru(cache) => cache.entries.lock().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStrategy")
            .field("cache_type", &self.cache_type())
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
