//! Reading, writing and restoring the cache configuration of a mount.

use crate::cache::CacheType;
use crate::errors::{Error, Result};
use crate::manager::LockManager;
use crate::storage::{Storage, StorageEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CACHE_TYPE_KEY: &str = "config/cache-type";
/// Record written by older mounts, holding only a size.
pub const LEGACY_CACHE_SIZE_KEY: &str = "config/cache-size";

/// Live or persisted cache configuration.
///
/// `capacity` is always 0 for [`CacheType::SyncMap`] and positive for [`CacheType::Lru`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub strategy: CacheType,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn unbounded() -> Self {
        Self {
            strategy: CacheType::SyncMap,
            capacity: 0,
        }
    }

    pub fn lru(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "lru cache capacity must be greater than zero".into(),
            ));
        }
        Ok(Self {
            strategy: CacheType::Lru,
            capacity,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Body of a configuration write: `{"cache-type": "lru", "cache-size": 50}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfigRequest {
    #[serde(rename = "cache-type")]
    pub cache_type: String,
    #[serde(rename = "cache-size", default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<i64>,
}

impl CacheConfigRequest {
    pub fn unlimited() -> Self {
        Self {
            cache_type: "unlimited".into(),
            cache_size: None,
        }
    }

    pub fn lru(size: i64) -> Self {
        Self {
            cache_type: "lru".into(),
            cache_size: Some(size),
        }
    }

    /// Validate the request into the configuration it asks for.
    pub fn resolve(&self) -> Result<CacheConfig> {
        match CacheType::parse(&self.cache_type) {
            CacheType::SyncMap => Ok(CacheConfig::unbounded()),
            CacheType::Lru => {
                let size = self.cache_size.unwrap_or(0);
                let capacity = usize::try_from(size).ok().filter(|size| *size > 0).ok_or_else(
                    || {
                        Error::InvalidRequest(
                            "for lru cache-type, cache-size must be specified and be greater than zero"
                                .into(),
                        )
                    },
                )?;
                CacheConfig::lru(capacity)
            }
            CacheType::NotImplemented => Err(Error::InvalidRequest(format!(
                "unknown cache-type {:?}",
                self.cache_type
            ))),
        }
    }
}

/// Body of a configuration read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfigView {
    pub cache_type: String,
    pub cache_max_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCacheType {
    #[serde(rename = "cacheType")]
    cache_type: CacheType,
    size: i64,
}

#[derive(Debug, Deserialize)]
struct LegacyCacheSize {
    #[serde(rename = "Size")]
    size: i64,
}

/// Translates between the configuration interface, the persisted record and the
/// live state of a [`LockManager`].
pub struct CacheConfigPersister {
    manager: Arc<LockManager>,
    storage: Arc<dyn Storage>,
    // Keeps the persisted record in step with the live cache when writes race.
    writes: Mutex<()>,
}

impl CacheConfigPersister {
    pub fn new(manager: Arc<LockManager>) -> Self {
        let storage = manager.storage().clone();
        Self {
            manager,
            storage,
            writes: Mutex::new(()),
        }
    }

    /// Configuration currently in effect.
    pub fn live(&self) -> CacheConfig {
        CacheConfig {
            strategy: self.manager.cache_type(),
            capacity: self.manager.cache_size(),
        }
    }

    pub fn read(&self) -> CacheConfigView {
        let live = self.live();
        CacheConfigView {
            cache_type: live.strategy.as_str().to_string(),
            cache_max_size: live.capacity,
        }
    }

    /// Validate, apply and persist a configuration write.
    ///
    /// Writing the configuration already in effect converts nothing and writes
    /// nothing. If the record cannot be persisted the previous configuration is
    /// applied again, so a retry of the same request does the full write.
    pub async fn write(&self, request: &CacheConfigRequest) -> Result<()> {
        let target = request.resolve()?;

        let _guard = self.writes.lock().await;
        if target == self.live() {
            debug!(cache_type = %target.strategy, capacity = target.capacity, "cache configuration unchanged");
            return Ok(());
        }

        let entry = StorageEntry::json(
            CACHE_TYPE_KEY,
            &StoredCacheType {
                cache_type: target.strategy,
                size: target.capacity as i64,
            },
        )?;
        let previous = self.live();
        self.apply(target)?;

        if let Err(err) = self.storage.put(entry).await {
            // The live cache must not run ahead of the persisted record.
            if let Err(rollback) = self.apply(previous) {
                warn!(error = %rollback, "failed to restore previous cache configuration");
            }
            return Err(Error::storage(format!("write {CACHE_TYPE_KEY}"), err));
        }
        Ok(())
    }

    /// Apply the persisted configuration, defaulting to an unbounded cache.
    pub async fn restore(&self) -> Result<CacheConfig> {
        let _guard = self.writes.lock().await;
        let target = match self.read_record(CACHE_TYPE_KEY).await? {
            Some(entry) => {
                let stored: StoredCacheType = entry.decode_json()?;
                match stored.cache_type {
                    CacheType::SyncMap => CacheConfig::unbounded(),
                    // Left unvalidated so a zero size fails as a conversion.
                    CacheType::Lru => CacheConfig {
                        strategy: CacheType::Lru,
                        capacity: stored_capacity(stored.size)?,
                    },
                    CacheType::NotImplemented => {
                        return Err(Error::InvalidConfiguration(
                            "persisted cache-type is not implemented".into(),
                        ));
                    }
                }
            }
            None => match self.read_record(LEGACY_CACHE_SIZE_KEY).await? {
                Some(entry) => {
                    let legacy: LegacyCacheSize = entry.decode_json()?;
                    match stored_capacity(legacy.size)? {
                        0 => CacheConfig::unbounded(),
                        capacity => CacheConfig::lru(capacity)?,
                    }
                }
                None => CacheConfig::unbounded(),
            },
        };

        self.apply(target)?;
        info!(cache_type = %target.strategy, capacity = target.capacity, "restored cache configuration");
        Ok(target)
    }

    fn apply(&self, target: CacheConfig) -> Result<()> {
        match target.strategy {
            CacheType::SyncMap => {
                self.manager.convert_cache_to_sync_map();
                Ok(())
            }
            CacheType::Lru => {
                self.manager
                    .convert_cache_to_lru(target.capacity)
                    .map_err(|err| Error::Conversion {
                        cache_type: "lru",
                        source: Box::new(err),
                    })
            }
            CacheType::NotImplemented => Err(Error::InvalidConfiguration(
                "cache-type is not implemented".into(),
            )),
        }
    }

    async fn read_record(&self, key: &str) -> Result<Option<StorageEntry>> {
        self.storage
            .get(key)
            .await
            .map_err(|err| Error::storage(format!("read {key}"), err))
    }
}

fn stored_capacity(size: i64) -> Result<usize> {
    usize::try_from(size).map_err(|_| {
        Error::InvalidConfiguration(format!("persisted cache size {size} is negative"))
    })
}
