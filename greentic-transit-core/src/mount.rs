use crate::cache_config::{CacheConfig, CacheConfigPersister};
use crate::errors::Result;
use crate::invalidation::{InvalidationChannel, InvalidationSender, handle_invalidation};
use crate::locks::DEFAULT_LOCK_SHARDS;
use crate::manager::{LockManager, ManagerConfig};
use crate::storage::Storage;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const DEFAULT_NATS_SUBJECT: &str = "transit.invalidate.>";

/// Runtime configuration captured when building a [`TransitMount`].
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub manager: ManagerConfig,
    /// Optional NATS endpoint delivering invalidations.
    pub nats_url: Option<String>,
    pub nats_subject: String,
    /// Cache configuration applied at startup.
    pub restored: CacheConfig,
}

/// Builder for [`TransitMount`] instances.
#[derive(Debug, Default)]
pub struct MountBuilder {
    caching_disabled: Option<bool>,
    lock_shards: Option<usize>,
    nats_url: Option<String>,
    nats_subject: Option<String>,
}

impl MountBuilder {
    /// Initialise the builder using environment configuration.
    ///
    /// * `GREENTIC_TRANSIT_CACHING_DISABLED` disables the policy cache (default: enabled).
    /// * `GREENTIC_TRANSIT_LOCK_SHARDS` sets the lock table size (default: 256).
    /// * `GREENTIC_TRANSIT_NATS_URL` records the NATS endpoint for invalidations.
    /// * `GREENTIC_TRANSIT_NATS_SUBJECT` overrides the invalidation subject.
    pub fn from_env() -> Self {
        let mut builder = MountBuilder::default();

        if let Ok(value) = std::env::var("GREENTIC_TRANSIT_CACHING_DISABLED") {
            builder.caching_disabled = Some(matches!(value.as_str(), "1" | "true" | "TRUE"));
        }

        if let Ok(value) = std::env::var("GREENTIC_TRANSIT_LOCK_SHARDS") {
            if let Ok(shards) = value.parse::<usize>() {
                builder.lock_shards = Some(shards.max(1));
            }
        }

        if let Ok(url) = std::env::var("GREENTIC_TRANSIT_NATS_URL") {
            if !url.trim().is_empty() {
                builder.nats_url = Some(url);
            }
        }

        if let Ok(subject) = std::env::var("GREENTIC_TRANSIT_NATS_SUBJECT") {
            if !subject.trim().is_empty() {
                builder.nats_subject = Some(subject);
            }
        }

        builder
    }

    pub fn caching_disabled(mut self, disabled: bool) -> Self {
        self.caching_disabled = Some(disabled);
        self
    }

    pub fn lock_shards(mut self, shards: usize) -> Self {
        self.lock_shards = Some(shards.max(1));
        self
    }

    pub fn nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }

    pub fn nats_subject(mut self, subject: impl Into<String>) -> Self {
        self.nats_subject = Some(subject.into());
        self
    }

    /// Build the mount and restore its persisted cache configuration.
    pub async fn build<S>(self, storage: S) -> Result<TransitMount>
    where
        S: Storage + 'static,
    {
        let manager_config = ManagerConfig {
            caching_disabled: self.caching_disabled.unwrap_or(false),
            lock_shards: self.lock_shards.unwrap_or(DEFAULT_LOCK_SHARDS),
        };
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let manager = Arc::new(LockManager::new(storage, manager_config.clone()));
        let cache_config = CacheConfigPersister::new(manager.clone());
        let restored = cache_config.restore().await?;

        Ok(TransitMount {
            config: MountConfig {
                manager: manager_config,
                nats_url: self.nats_url,
                nats_subject: self
                    .nats_subject
                    .unwrap_or_else(|| DEFAULT_NATS_SUBJECT.to_string()),
                restored,
            },
            manager,
            cache_config,
        })
    }
}

/// One transit engine mount: the lock manager plus its cache configuration.
pub struct TransitMount {
    config: MountConfig,
    manager: Arc<LockManager>,
    cache_config: CacheConfigPersister,
}

impl TransitMount {
    pub fn builder() -> MountBuilder {
        MountBuilder::from_env()
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<LockManager> {
        &self.manager
    }

    pub fn cache_config(&self) -> &CacheConfigPersister {
        &self.cache_config
    }

    /// Invalidation callback for a changed storage key.
    pub async fn invalidate(&self, key: &str) -> bool {
        handle_invalidation(&self.manager, key).await
    }

    /// Start an ordered invalidation consumer bound to this mount.
    pub fn spawn_invalidation_channel(&self) -> (InvalidationSender, JoinHandle<()>) {
        InvalidationChannel::spawn(self.manager.clone())
    }
}
