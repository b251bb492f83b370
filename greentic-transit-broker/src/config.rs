use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use transit_core::{FileStorage, MemoryStorage, Storage};

const DEFAULT_FILE_ROOT: &str = ".transit";

/// Where the mount keeps its policies and configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File(PathBuf),
}

impl StorageKind {
    /// Resolve a storage kind name (`memory` or `file`) with an optional root path.
    pub fn parse(kind: &str, path: Option<PathBuf>) -> Result<Self> {
        match kind {
            "memory" | "dev" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File(
                path.unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_ROOT)),
            )),
            other => Err(anyhow!("unsupported storage `{other}`")),
        }
    }
}

pub fn load_storage(kind: &StorageKind) -> Arc<dyn Storage> {
    match kind {
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
        StorageKind::File(root) => Arc::new(FileStorage::new(root.clone())),
    }
}
