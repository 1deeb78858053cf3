use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::fs::File;
use std::io::BufReader;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Connection pool type alias
pub type DbPool = Pool;

fn pool_config(config: &config::DatabaseConfig) -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(
        config
            .host
            .clone()
            .unwrap_or_else(|| "localhost".to_string()),
    );
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_connections as usize));
    cfg
}

/// Create the connection pool, with rustls when TLS is enabled
pub async fn create_pool(config: &config::DatabaseConfig) -> anyhow::Result<DbPool> {
    let cfg = pool_config(config);

    let pool = if config.tls_enabled {
        create_pool_with_rustls(cfg, config.tls_ca_cert_path.as_deref())?
    } else {
        info!("Creating database pool without TLS");
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Fail fast on unreachable databases
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    client.simple_query("SELECT 1").await?;

    info!(
        max_connections = config.max_connections,
        tls = config.tls_enabled,
        "Database pool ready"
    );
    Ok(pool)
}

/// Create pool using rustls with either custom certificate or platform verifier
pub fn create_pool_with_rustls(cfg: Config, cert_path: Option<&str>) -> anyhow::Result<Pool> {
    use tokio_postgres_rustls::MakeRustlsConnect;

    // Install the default crypto provider (ring) if not already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let client_config = if let Some(cert_path) = cert_path {
        debug!("Loading CA certificate from: {}", cert_path);

        let cert_file = File::open(cert_path)
            .map_err(|e| anyhow::anyhow!("Failed to open certificate file {}: {}", cert_path, e))?;
        let mut reader = BufReader::new(cert_file);

        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate: {}", e))?;

        if certs.is_empty() {
            return Err(anyhow::anyhow!("No certificates found in {}", cert_path));
        }

        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs {
            root_store
                .add(cert)
                .map_err(|e| anyhow::anyhow!("Failed to add certificate to root store: {}", e))?;
        }

        info!(
            "Using rustls with {} custom CA certificate(s) from {}",
            root_store.len(),
            cert_path
        );

        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        info!("Using rustls with platform verifier (OS certificate store)");

        use rustls_platform_verifier::ConfigVerifierExt;
        rustls::ClientConfig::with_platform_verifier()
            .map_err(|e| anyhow::anyhow!("Failed to create platform verifier: {}", e))?
    };

    let tls = MakeRustlsConnect::new(client_config);

    cfg.create_pool(Some(Runtime::Tokio1), tls)
        .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))
}
