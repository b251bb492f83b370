//! Shared entry point for every operation that reads or changes a key policy.

use crate::cache::{CacheStrategy, CacheType};
use crate::errors::{Error, Result};
use crate::locks::{DEFAULT_LOCK_SHARDS, PolicyLockTable};
use crate::policy::{KeyPolicy, validate_name};
use crate::storage::{Storage, StorageEntry, policy_key};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Options fixed for the lifetime of a manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Serialise per name but never read or populate the cache.
    pub caching_disabled: bool,
    /// Number of shards in the per-name lock table.
    pub lock_shards: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            caching_disabled: false,
            lock_shards: DEFAULT_LOCK_SHARDS,
        }
    }
}

/// Owns the active cache strategy and the per-name lock table.
///
/// Every async operation is cancel-safe: dropping the future while it waits for a
/// shard or for storage releases the shard and leaves the cache as it was. Once a
/// loaded policy is inserted it stays cached even if the caller goes away.
pub struct LockManager {
    storage: Arc<dyn Storage>,
    caching_disabled: bool,
    locks: PolicyLockTable,
    // The write side of this lock is the manager-wide exclusive lock taken only to
    // swap strategies. Readers hold it just long enough to clone the `Arc`.
    cache: RwLock<Arc<CacheStrategy>>,
    conversions: AtomicU64,
}

impl LockManager {
    pub fn new(storage: Arc<dyn Storage>, config: ManagerConfig) -> Self {
        Self {
            storage,
            caching_disabled: config.caching_disabled,
            locks: PolicyLockTable::new(config.lock_shards),
            cache: RwLock::new(Arc::new(CacheStrategy::unbounded())),
            conversions: AtomicU64::new(0),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn locks(&self) -> &PolicyLockTable {
        &self.locks
    }

    pub fn caching_disabled(&self) -> bool {
        self.caching_disabled
    }

    fn active(&self) -> Arc<CacheStrategy> {
        self.cache.read().clone()
    }

    fn cached(&self, name: &str) -> Option<Arc<KeyPolicy>> {
        if self.caching_disabled {
            return None;
        }
        self.active().get(name)
    }

    fn store_cache(&self, name: &str, policy: Arc<KeyPolicy>) {
        if self.caching_disabled {
            return;
        }
        if let Some(evicted) = self.active().put(name.to_string(), policy) {
            debug!(policy = %evicted, "evicted least recently used policy");
        }
    }

    /// Return the policy `name`, loading it from storage on a miss.
    ///
    /// Concurrent misses for the same name perform a single storage read; the
    /// others wait on the name's shard and then find the cached entry.
    pub async fn get_policy(&self, name: &str) -> Result<Arc<KeyPolicy>> {
        validate_name(name)?;
        if let Some(policy) = self.cached(name) {
            return Ok(policy);
        }

        let _lock = self.locks.lock(name).await;
        if let Some(policy) = self.cached(name) {
            return Ok(policy);
        }

        let policy = Arc::new(self.load(name).await?);
        self.store_cache(name, policy.clone());
        Ok(policy)
    }

    /// Apply `mutator` to the current policy, persist the result and cache it.
    ///
    /// Callers observe either the previous policy or the fully persisted new one.
    /// A failing mutator leaves storage and cache untouched.
    pub async fn update_policy<F>(&self, name: &str, mutator: F) -> Result<Arc<KeyPolicy>>
    where
        F: FnOnce(&mut KeyPolicy) -> Result<()>,
    {
        validate_name(name)?;
        let _lock = self.locks.lock(name).await;

        let current = match self.cached(name) {
            Some(policy) => policy,
            None => Arc::new(self.load(name).await?),
        };

        let mut next = KeyPolicy::clone(&current);
        mutator(&mut next)?;
        if next.name != name {
            return Err(Error::InvalidRequest(format!(
                "policy {name} cannot be renamed to {}",
                next.name
            )));
        }

        self.persist(&next).await?;
        let next = Arc::new(next);
        self.store_cache(name, next.clone());
        Ok(next)
    }

    /// Persist and cache a policy that does not exist yet.
    pub async fn create_policy(&self, policy: KeyPolicy) -> Result<Arc<KeyPolicy>> {
        validate_name(&policy.name)?;
        let _lock = self.locks.lock(&policy.name).await;

        if self.cached(&policy.name).is_some() || self.read_entry(&policy.name).await?.is_some() {
            return Err(Error::InvalidRequest(format!(
                "policy {} already exists",
                policy.name
            )));
        }

        self.persist(&policy).await?;
        let name = policy.name.clone();
        let policy = Arc::new(policy);
        self.store_cache(&name, policy.clone());
        Ok(policy)
    }

    /// Remove a policy from storage and from the cache.
    pub async fn delete_policy(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _lock = self.locks.lock(name).await;

        let policy = match self.cached(name) {
            Some(policy) => policy,
            None => Arc::new(self.load(name).await?),
        };
        if !policy.deletion_allowed {
            return Err(Error::InvalidRequest(format!(
                "deletion is not allowed for policy {name}"
            )));
        }

        let key = policy_key(name);
        self.storage
            .delete(&key)
            .await
            .map_err(|err| Error::storage(format!("delete {key}"), err))?;
        self.active().evict(name);
        Ok(())
    }

    /// Drop the cached entry for `name` so the next read goes to storage.
    pub async fn invalidate(&self, name: &str) {
        let _lock = self.locks.lock(name).await;
        if self.active().evict(name).is_some() {
            debug!(policy = %name, "invalidated cached policy");
        }
    }

    pub fn cache_type(&self) -> CacheType {
        self.active().cache_type()
    }

    /// Configured capacity of the active strategy; 0 when unbounded.
    pub fn cache_size(&self) -> usize {
        self.active().capacity()
    }

    /// Number of policies currently resident.
    pub fn cached_len(&self) -> usize {
        self.active().len()
    }

    /// Conversions applied since construction.
    pub fn conversion_count(&self) -> u64 {
        self.conversions.load(Ordering::SeqCst)
    }

    /// Switch to a fresh unbounded cache. No-op when already unbounded.
    pub fn convert_cache_to_sync_map(&self) {
        let mut active = self.cache.write();
        if active.cache_type() == CacheType::SyncMap {
            return;
        }
        *active = Arc::new(CacheStrategy::unbounded());
        drop(active);

        self.conversions.fetch_add(1, Ordering::SeqCst);
        info!(cache_type = %CacheType::SyncMap, capacity = 0, "converted policy cache");
    }

    /// Switch to a fresh LRU cache holding at most `capacity` policies.
    ///
    /// No-op when the active cache is already an LRU of the same capacity. On error
    /// the previous cache stays active.
    pub fn convert_cache_to_lru(&self, capacity: usize) -> Result<()> {
        let replacement = CacheStrategy::lru(capacity)?;

        let mut active = self.cache.write();
        if active.cache_type() == CacheType::Lru && active.capacity() == capacity {
            return Ok(());
        }
        *active = Arc::new(replacement);
        drop(active);

        self.conversions.fetch_add(1, Ordering::SeqCst);
        info!(cache_type = %CacheType::Lru, capacity, "converted policy cache");
        Ok(())
    }

    async fn read_entry(&self, name: &str) -> Result<Option<StorageEntry>> {
        let key = policy_key(name);
        self.storage
            .get(&key)
            .await
            .map_err(|err| Error::storage(format!("read {key}"), err))
    }

    async fn load(&self, name: &str) -> Result<KeyPolicy> {
        debug!(policy = %name, "loading policy from storage");
        let entry = self
            .read_entry(name)
            .await?
            .ok_or_else(|| Error::not_found(name))?;
        KeyPolicy::decode(name, &entry.value)
    }

    async fn persist(&self, policy: &KeyPolicy) -> Result<()> {
        let entry = StorageEntry::new(policy_key(&policy.name), policy.encode()?);
        let context = format!("write {}", entry.key);
        self.storage
            .put(entry)
            .await
            .map_err(|err| Error::storage(context, err))
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("caching_disabled", &self.caching_disabled)
            .field("lock_shards", &self.locks.shard_count())
            .field("cache", &*self.active())
            .finish()
    }
}
