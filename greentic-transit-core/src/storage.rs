use crate::errors::{Error, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage prefix under which key policies are persisted.
pub const POLICY_PREFIX: &str = "policy/";

pub fn policy_key(name: &str) -> String {
    format!("{POLICY_PREFIX}{name}")
}

/// A single durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Serialise `value` as JSON into an entry stored at `key`.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, Error> {
        let key = key.into();
        let value = serde_json::to_vec(value).map_err(|err| Error::Encode {
            name: key.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self { key, value })
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.value).map_err(|err| Error::Decode {
            name: self.key.clone(),
            reason: err.to_string(),
        })
    }
}

/// Get/put/delete by string key. Implementations own durability and retries.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>>;
    async fn put(&self, entry: StorageEntry) -> StorageResult<()>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

#[async_trait]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        (**self).get(key).await
    }
    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        (**self).put(entry).await
    }
    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T> Storage for Box<T>
where
    T: Storage + ?Sized,
{
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        (**self).get(key).await
    }
    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        (**self).put(entry).await
    }
    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }
}

/// Simple in-memory storage suitable for development mounts and tests.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        let guard = self.state.lock();
        Ok(guard
            .get(key)
            .map(|value| StorageEntry::new(key, value.clone())))
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        self.state.lock().insert(entry.key, entry.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.state.lock().remove(key);
        Ok(())
    }
}


#[cfg(feature = "file")]
pub mod file;
