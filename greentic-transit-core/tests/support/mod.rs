#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use transit_core::errors::StorageError;
use transit_core::storage::{StorageResult, policy_key};
use transit_core::{KeyPolicy, MemoryStorage, Storage, StorageEntry};

/// Storage wrapper that records traffic and can be slowed down or broken.
#[derive(Clone, Default)]
pub struct CountingStorage {
    inner: Arc<MemoryStorage>,
    gets: Arc<Mutex<HashMap<String, usize>>>,
    puts: Arc<AtomicUsize>,
    read_delay: Arc<Mutex<Option<Duration>>>,
    fail_reads: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_calls(&self, key: &str) -> usize {
        self.gets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn policy_reads(&self, name: &str) -> usize {
        self.get_calls(&policy_key(name))
    }

    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.unwrap().map(|entry| entry.value)
    }

    /// Write a policy directly, bypassing any cache.
    pub async fn seed(&self, policy: &KeyPolicy) {
        self.inner
            .put(StorageEntry::new(
                policy_key(&policy.name),
                policy.encode().unwrap(),
            ))
            .await
            .unwrap();
    }

    pub async fn stored(&self, name: &str) -> Option<KeyPolicy> {
        self.inner
            .get(&policy_key(name))
            .await
            .unwrap()
            .map(|entry| KeyPolicy::decode(name, &entry.value).unwrap())
    }

    pub async fn put_raw(&self, key: &str, value: &[u8]) {
        self.inner
            .put(StorageEntry::new(key, value.to_vec()))
            .await
            .unwrap();
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        *self.gets.lock().unwrap().entry(key.to_string()).or_default() += 1;
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::new("backend unavailable"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::new("disk full"));
        }
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }
}

pub fn policy(name: &str) -> KeyPolicy {
    let mut policy = KeyPolicy::new(name, "aes256-gcm96");
    policy.push_version(1_700_000_000, vec![1; 32]);
    policy
}
