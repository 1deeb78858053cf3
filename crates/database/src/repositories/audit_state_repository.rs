use crate::pool::DbPool;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use services::reconciliation::{AssignmentSnapshot, AuditStateRepository, ExitHistory};

pub const SNAPSHOT_KEY: &str = "assignment_snapshot";
pub const EXIT_HISTORY_KEY: &str = "exit_history";

/// The two audit blobs, one `audit_state` row each
pub struct PostgresAuditStateRepository {
    pool: DbPool,
}

impl PostgresAuditStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Missing rows read as the empty value
    async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT payload FROM audit_state WHERE key = $1", &[&key])
            .await?;

        match row {
            Some(row) => Ok(serde_json::from_value(row.get::<_, serde_json::Value>(0))?),
            None => Ok(T::default()),
        }
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_value(value)?;
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO audit_state (key, payload, updated_at)
                 VALUES ($1, $2, NOW())
                 ON CONFLICT (key) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()",
                &[&key, &payload],
            )
            .await?;
        tracing::debug!("Repository: Saved audit state key={}", key);
        Ok(())
    }
}

#[async_trait]
impl AuditStateRepository for PostgresAuditStateRepository {
    async fn load_snapshot(&self) -> anyhow::Result<AssignmentSnapshot> {
        self.load(SNAPSHOT_KEY).await
    }

    async fn save_snapshot(&self, snapshot: &AssignmentSnapshot) -> anyhow::Result<()> {
        self.save(SNAPSHOT_KEY, snapshot).await
    }

    async fn load_exit_history(&self) -> anyhow::Result<ExitHistory> {
        self.load(EXIT_HISTORY_KEY).await
    }

    async fn save_exit_history(&self, history: &ExitHistory) -> anyhow::Result<()> {
        self.save(EXIT_HISTORY_KEY, history).await
    }
}
