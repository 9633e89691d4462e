use std::collections::HashMap;
use std::sync::RwLock;

use super::{StateStore, StoreError};

/// In-memory state store.
///
/// Intended for tests/dev; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one blob (e.g. a snapshot from an earlier run).
    pub fn with_blob(key: &str, blob: impl Into<String>) -> Self {
        let mut blobs = HashMap::new();
        blobs.insert(key.to_string(), blob.into());
        Self {
            blobs: RwLock::new(blobs),
        }
    }

    /// Latest blob under `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs.read().ok()?.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        blobs.remove(key);
        Ok(())
    }
}
