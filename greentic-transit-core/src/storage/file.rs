use crate::errors::StorageError;
use crate::storage::{Storage, StorageEntry, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Filesystem-backed storage; each key maps to one file below `root`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for_key(&self, key: &str) -> StorageResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() {
                return Err(StorageError::new(format!("invalid storage key {key:?}")));
            }
            path.push(encode_segment(segment));
        }
        Ok(path)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<StorageEntry>> {
        let path = self.path_for_key(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(StorageEntry::new(key, bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::new(err.to_string())),
        }
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        let path = self.path_for_key(&entry.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::new(err.to_string()))?;
        }
        let mut file = fs::File::create(&path)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        file.write_all(&entry.value)
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        file.sync_all()
            .await
            .map_err(|err| StorageError::new(err.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for_key(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::new(err.to_string())),
        }
    }
}

/// Map a key segment to a file name. Bytes outside `[A-Za-z0-9-]` become `_XX`
/// (upper-case hex), so distinct segments never share a file.
fn encode_segment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("_{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        assert!(storage.get("policy/orders").await.unwrap().is_none());
        storage
            .put(StorageEntry::new("policy/orders", b"{}".to_vec()))
            .await
            .unwrap();
        assert!(dir.path().join("policy").join("orders").exists());
        assert_eq!(
            storage.get("policy/orders").await.unwrap().unwrap().value,
            b"{}".to_vec()
        );

        storage.delete("policy/orders").await.unwrap();
        storage.delete("policy/orders").await.unwrap();
        assert!(storage.get("policy/orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dots_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("root"));
        storage
            .put(StorageEntry::new("policy/..", b"x".to_vec()))
            .await
            .unwrap();
        assert!(dir.path().join("root").join("policy").join("_2E_2E").exists());
        assert!(storage.get("policy//orders").await.is_err());
    }

    #[test]
    fn escaped_segments_stay_distinct() {
        let names = ["orders.v2", "orders_v2", "orders_2Ev2", "orders v2", "orders"];
        let encoded: std::collections::HashSet<_> =
            names.iter().map(|name| encode_segment(name)).collect();
        assert_eq!(encoded.len(), names.len());
        assert_eq!(encode_segment("cache-type"), "cache-type");
        assert_eq!(encode_segment("orders.v2"), "orders_2Ev2");
        assert_eq!(encode_segment("orders_v2"), "orders_5Fv2");
    }

    #[tokio::test]
    async fn names_differing_in_punctuation_use_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage
            .put(StorageEntry::new("policy/orders.v2", b"dotted".to_vec()))
            .await
            .unwrap();

        assert!(storage.get("policy/orders_v2").await.unwrap().is_none());
        storage
            .put(StorageEntry::new("policy/orders_v2", b"underscored".to_vec()))
            .await
            .unwrap();
        assert_eq!(
            storage.get("policy/orders.v2").await.unwrap().unwrap().value,
            b"dotted".to_vec()
        );
        assert_eq!(
            storage.get("policy/orders_v2").await.unwrap().unwrap().value,
            b"underscored".to_vec()
        );
    }
}
