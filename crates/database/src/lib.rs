pub mod cache;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use cache::{CachedCredentialRepository, CachedCustomerRepository};
pub use pool::{create_pool, DbPool};
pub use repositories::{
    PostgresAuditStateRepository, PostgresCredentialRepository, PostgresCustomerRepository,
};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Database service combining all repositories
pub struct Database {
    pool: DbPool,
    customer_repository: Arc<CachedCustomerRepository>,
    credential_repository: Arc<CachedCredentialRepository>,
    audit_state_repository: Arc<PostgresAuditStateRepository>,
}

impl Database {
    /// Create a new database service from a connection pool.
    ///
    /// Customer and credential list reads are cached for `cache_ttl`.
    pub fn new(pool: DbPool, cache_ttl: Duration) -> Self {
        Self {
            customer_repository: Arc::new(CachedCustomerRepository::new(
                Arc::new(PostgresCustomerRepository::new(pool.clone())),
                cache_ttl,
            )),
            credential_repository: Arc::new(CachedCredentialRepository::new(
                Arc::new(PostgresCredentialRepository::new(pool.clone())),
                cache_ttl,
            )),
            audit_state_repository: Arc::new(PostgresAuditStateRepository::new(pool.clone())),
            pool,
        }
    }

    /// Create a new database service from configuration
    pub async fn from_config(config: &config::DatabaseConfig, cache_ttl: Duration) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool, cache_ttl))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn customer_repository(&self) -> Arc<CachedCustomerRepository> {
        self.customer_repository.clone()
    }

    pub fn credential_repository(&self) -> Arc<CachedCredentialRepository> {
        self.credential_repository.clone()
    }

    pub fn audit_state_repository(&self) -> Arc<PostgresAuditStateRepository> {
        self.audit_state_repository.clone()
    }
}
