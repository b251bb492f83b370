use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_LOCK_SHARDS: usize = 256;

/// Fixed set of mutexes partitioning per-name exclusion by a hash of the name.
///
/// Shards are allocated once and never freed, so memory stays bounded no matter
/// how many distinct names are seen. Names that share a shard serialise with each
/// other; names on distinct shards proceed in parallel.
pub struct PolicyLockTable {
    shards: Box<[Mutex<()>]>,
}

/// Exclusive hold on the shard of one policy name. Dropping it releases the shard.
pub type PolicyLock<'a> = MutexGuard<'a, ()>;

impl PolicyLockTable {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(())).collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, name: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Wait for the shard guarding `name`.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the shard untouched.
    pub async fn lock(&self, name: &str) -> PolicyLock<'_> {
        self.shards[self.shard_index(name)].lock().await
    }

    pub fn try_lock(&self, name: &str) -> Option<PolicyLock<'_>> {
        self.shards[self.shard_index(name)].try_lock().ok()
    }
}

impl Default for PolicyLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_SHARDS)
    }
}
