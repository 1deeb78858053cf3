use crate::pool::DbPool;
use async_trait::async_trait;
use services::{
    credential::{Credential, CredentialRepository},
    CredentialId,
};
use tokio_postgres::Row;

fn credential_from_row(row: &Row) -> Credential {
    Credential {
        id: row.get("id"),
        service: row.get("service"),
        secret_email: row.get("secret_email"),
        secret_password: row.get("secret_password"),
        published_at: row.get("published_at"),
        visible: row.get("visible"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct PostgresCredentialRepository {
    pool: DbPool,
}

impl PostgresCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn list_credentials(&self) -> anyhow::Result<Vec<Credential>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, service, secret_email, secret_password, published_at, visible,
                        created_at, updated_at
                 FROM credentials
                 ORDER BY published_at, id",
                &[],
            )
            .await?;
        Ok(rows.iter().map(credential_from_row).collect())
    }

    async fn get_credential(&self, id: CredentialId) -> anyhow::Result<Option<Credential>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, service, secret_email, secret_password, published_at, visible,
                        created_at, updated_at
                 FROM credentials
                 WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(credential_from_row))
    }

    async fn upsert_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        tracing::info!(
            "Repository: Upserting credential_id={} service={}",
            credential.id,
            credential.service
        );

        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO credentials (
                    id, service, secret_email, secret_password, published_at, visible,
                    created_at, updated_at
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (id) DO UPDATE SET
                    service = EXCLUDED.service,
                    secret_email = EXCLUDED.secret_email,
                    secret_password = EXCLUDED.secret_password,
                    published_at = EXCLUDED.published_at,
                    visible = EXCLUDED.visible,
                    updated_at = EXCLUDED.updated_at",
                &[
                    &credential.id,
                    &credential.service,
                    &credential.secret_email,
                    &credential.secret_password,
                    &credential.published_at,
                    &credential.visible,
                    &credential.created_at,
                    &credential.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_credential(&self, id: CredentialId) -> anyhow::Result<()> {
        tracing::info!("Repository: Deleting credential_id={}", id);

        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM credentials WHERE id = $1", &[&id])
            .await?;
        if deleted == 0 {
            anyhow::bail!("Credential {} not found", id);
        }
        Ok(())
    }
}
