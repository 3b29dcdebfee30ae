//! Last Device Persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value persistence for the last connected adapter
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn save_last_device_id(&self, id: &str) -> Result<(), StoreError>;

    async fn load_last_device_id(&self) -> Result<Option<String>, StoreError>;
}

/// Volatile store, lost on restart
#[derive(Default)]
pub struct MemoryDeviceStore {
    last_device_id: Mutex<Option<String>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn save_last_device_id(&self, id: &str) -> Result<(), StoreError> {
        *self
            .last_device_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        Ok(())
    }

    async fn load_last_device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .last_device_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    last_device_id: Option<String>,
}

/// Store backed by a small JSON file
pub struct JsonFileDeviceStore {
    path: PathBuf,
}

impl JsonFileDeviceStore {
    /// Store backed by the JSON file at `path`, created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StateFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DeviceStore for JsonFileDeviceStore {
    async fn save_last_device_id(&self, id: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let state = StateFile {
            last_device_id: Some(id.to_string()),
        };
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&state)?).await?;
        debug!("Saved last device {} to {}", id, self.path.display());
        Ok(())
    }

    async fn load_last_device_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read().await?.last_device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryDeviceStore::new();
        assert_eq!(store.load_last_device_id().await.unwrap(), None);
        store.save_last_device_id("AA:BB").await.unwrap();
        assert_eq!(
            store.load_last_device_id().await.unwrap().as_deref(),
            Some("AA:BB")
        );
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDeviceStore::new(dir.path().join("state").join("dpfd.json"));

        assert_eq!(store.load_last_device_id().await.unwrap(), None);
        store.save_last_device_id("/dev/rfcomm0").await.unwrap();

        let reopened = JsonFileDeviceStore::new(store.path());
        assert_eq!(
            reopened.load_last_device_id().await.unwrap().as_deref(),
            Some("/dev/rfcomm0")
        );
    }

    #[tokio::test]
    async fn test_json_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpfd.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileDeviceStore::new(&path);
        assert!(matches!(
            store.load_last_device_id().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
