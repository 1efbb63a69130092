use async_trait::async_trait;
use sqlx::SqlitePool;

/// Durable key/value profile store.
///
/// Holds the active/selected dispatch ids, sequencing flags, per-stop
/// uncompleted-form counts, the pending arrival-trigger list, and the
/// arrival-dialog flag. No transactional guarantee across keys.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Well-known profile store keys
pub mod keys {
    pub const ACTIVE_DISPATCH: &str = "dispatch.active";
    pub const SELECTED_DISPATCH: &str = "dispatch.selected";
    pub const PENDING_TRIGGERS: &str = "arrival.pending_triggers";
    pub const DIALOG_ACTIVE: &str = "arrival.dialog_active";

    pub fn sequenced(dispatch_id: &str) -> String {
        format!("trip.{dispatch_id}.sequenced")
    }

    pub fn eligible_stop(dispatch_id: &str) -> String {
        format!("trip.{dispatch_id}.eligible_stop")
    }

    pub fn incomplete_stops(dispatch_id: &str) -> String {
        format!("trip.{dispatch_id}.incomplete_stops")
    }

    pub fn form_count(stop_id: &str) -> String {
        format!("stop.{stop_id}.uncompleted_forms")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt value for key {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// SQLite-backed profile store
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    /// Create the store and ensure its table exists.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM profile WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profile (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM profile WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }
}
