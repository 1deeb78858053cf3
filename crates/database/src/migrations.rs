//! Embedded, ordered schema migrations tracked in `schema_migrations`.

use crate::pool::DbPool;

pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "customers",
        sql: include_str!("../migrations/V1__customers.sql"),
    },
    Migration {
        version: 2,
        name: "credentials",
        sql: include_str!("../migrations/V2__credentials.sql"),
    },
    Migration {
        version: 3,
        name: "audit_state",
        sql: include_str!("../migrations/V3__audit_state.sql"),
    },
];

/// Apply every migration newer than the recorded version, each in its own transaction
pub async fn run(pool: &DbPool) -> anyhow::Result<()> {
    let mut client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await?;

    let row = client
        .query_one("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", &[])
        .await?;
    let current: i32 = row.get(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
            &[&migration.version, &migration.name],
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
