//! Key-policy cache and lock manager for the transit secrets engine.

pub mod cache;
pub mod cache_config;
pub mod errors;
pub mod invalidation;
pub mod locks;
pub mod manager;
pub mod mount;
pub mod policy;
pub mod storage;

pub use cache::{CacheStrategy, CacheType};
pub use cache_config::{CacheConfig, CacheConfigPersister, CacheConfigRequest, CacheConfigView};
pub use errors::{Error, Result, StorageError};
pub use invalidation::{InvalidationChannel, InvalidationSender, handle_invalidation};
pub use locks::PolicyLockTable;
pub use manager::{LockManager, ManagerConfig};
pub use mount::{MountBuilder, MountConfig, TransitMount};
pub use policy::{KeyPolicy, KeyVersion};
pub use storage::{MemoryStorage, Storage, StorageEntry};
#[cfg(feature = "file")]
pub use storage::file::FileStorage;
