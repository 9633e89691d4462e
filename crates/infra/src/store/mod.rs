//! Key → blob persistence for engine state.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStateStore;
pub use sqlite::SqliteStateStore;

/// State store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable key-value storage for serialized state.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace the blob under `key`.
    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
