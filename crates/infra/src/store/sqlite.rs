//! SQLite-backed state store (`kv_store` table).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{StateStore, StoreError};

/// SQLite key-value store.
///
/// The pool is opened lazily on first use, creating the database file and
/// its parent directory if needed. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    path: PathBuf,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn ensure_initialized(&self) -> anyhow::Result<SqlitePool> {
        let mut pool_guard = self.pool.lock().await;
        if let Some(pool) = pool_guard.as_ref() {
            return Ok(pool.clone());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state directory at {:?}", parent))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", self.path.to_string_lossy());
        let pool = SqlitePool::connect(&db_url)
            .await
            .with_context(|| format!("failed to open state database at {:?}", self.path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_store table")?;

        tracing::debug!(path = ?self.path, "state store initialized");
        *pool_guard = Some(pool.clone());
        Ok(pool)
    }

    async fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.ensure_initialized()
            .await
            .map_err(|e| StoreError::Storage(format!("{e:#}")))
    }
}

fn sql_error(op: &str, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("{op}: {err}"))
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .map_err(|e| sql_error("load", e))?;

        match row {
            Some(row) => Ok(Some(
                row.try_get::<String, _>("value")
                    .map_err(|e| sql_error("load", e))?,
            )),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .map_err(|e| sql_error("save", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .map_err(|e| sql_error("delete", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir()
            .join("catbridge-tests")
            .join(format!("{}.db", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn blobs_survive_reopening() {
        let path = temp_db();

        let store = SqliteStateStore::new(&path);
        assert_eq!(store.load("migration_state").await.unwrap(), None);
        store.save("migration_state", "{\"a\":1}").await.unwrap();
        store.save("migration_state", "{\"a\":2}").await.unwrap();

        let reopened = SqliteStateStore::new(&path);
        assert_eq!(
            reopened.load("migration_state").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );

        reopened.delete("migration_state").await.unwrap();
        assert_eq!(reopened.load("migration_state").await.unwrap(), None);

        let _ = std::fs::remove_file(path);
    }
}
