use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;

use crate::error::AppError;

/// Durable key-value store holding JSON documents under namespaced keys.
#[derive(Clone, Debug)]
pub struct KvStore {
    db: SqlitePool,
}

impl KvStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
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
        .bind(value)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok(result > 0)
    }

    /// `Ok(None)` when the key was never written; a document that fails to
    /// parse is an error, not an absence.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_pool;

    async fn setup_store() -> KvStore {
        let pool = open_pool("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        KvStore::new(pool)
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_key() {
        let store = setup_store().await;

        store.set("ns.key", "one").await.expect("Failed to set");
        store.set("ns.key", "two").await.expect("Failed to overwrite");

        let value = store.get("ns.key").await.expect("Failed to get");
        assert_eq!(value.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_remove_reports_whether_key_existed() {
        let store = setup_store().await;

        store.set("ns.key", "[]").await.expect("Failed to set");
        assert!(store.remove("ns.key").await.expect("Failed to remove"));
        assert!(!store.remove("ns.key").await.expect("Failed to remove"));
        assert_eq!(store.get("ns.key").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_get_json_distinguishes_absent_from_corrupt() {
        let store = setup_store().await;

        let absent: Option<Vec<u64>> = store.get_json("ns.missing").await.expect("absent is fine");
        assert_eq!(absent, None);

        store.set("ns.broken", "{not json").await.expect("Failed to set");
        let corrupt = store.get_json::<Vec<u64>>("ns.broken").await;
        assert!(matches!(corrupt, Err(AppError::Serialization(_))));
    }
}
