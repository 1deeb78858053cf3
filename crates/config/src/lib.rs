use serde::Deserialize;
use std::collections::HashMap;

/// Reads `<name>_FILE` if set, otherwise `<name>`.
///
/// A configured but unreadable file is a startup error.
fn secret_from_env(name: &str) -> Option<String> {
    let file_var = format!("{}_FILE", name);
    if let Ok(path) = std::env::var(&file_var) {
        let value = std::fs::read_to_string(&path)
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|e| panic!("Failed to read {} at {}: {}", file_var, path, e));
        return Some(value);
    }
    std::env::var(name).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated env var value into non-empty trimmed entries.
fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `None` means unlimited
fn parse_capacity(value: &str) -> Option<Option<usize>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("unlimited") {
        return Some(None);
    }
    value.parse::<usize>().ok().filter(|n| *n > 0).map(Some)
}

/// Parses `name=value,name=value`; malformed pairs are skipped
fn parse_pairs<T>(raw: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<(String, T)> {
    split_csv(raw)
        .into_iter()
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, parse(value)?))
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub tls_enabled: bool,
    pub tls_ca_cert_path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("DATABASE_HOST").ok(),
            port: parse_env("DATABASE_PORT", 5432),
            database: std::env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "credential_engine".to_string()),
            username: std::env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: secret_from_env("DATABASE_PASSWORD")
                .unwrap_or_else(|| "postgres".to_string()),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10),
            tls_enabled: parse_env("DATABASE_TLS_ENABLED", false),
            tls_ca_cert_path: std::env::var("DATABASE_TLS_CA_CERT_PATH").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("SERVER_PORT", 8080),
        }
    }
}

/// Bearer token guarding the admin API
#[derive(Clone, Deserialize)]
pub struct AdminConfig {
    pub api_token: Option<String>,
}

// Never print the token
impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            api_token: secret_from_env("ADMIN_API_TOKEN").filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level for the application.
    ///
    /// Valid values: "error", "warn", "info", "debug", "trace".
    /// Default: "info" (from LOG_LEVEL env var or fallback).
    pub level: String,

    /// Log output format.
    ///
    /// Valid values: "pretty", "json".
    /// Default: "pretty" (from LOG_FORMAT env var or fallback).
    pub format: String,

    /// Per-module log levels.
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        for (module, var) in [
            ("api", "LOG_MODULE_API"),
            ("services", "LOG_MODULE_SERVICES"),
            ("database", "LOG_MODULE_DATABASE"),
        ] {
            if let Ok(level) = std::env::var(var) {
                modules.insert(module.to_string(), level);
            }
        }

        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        }
    }
}

/// Timing rules for expiry, cleanup and background passes
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Days after expiry during which access continues (grace period)
    pub grace_days: i64,
    /// Days past expiry before the janitor drops a subscription
    pub janitor_buffer_days: i64,
    pub default_duration_months: u32,
    /// Credentials whose email contains this marker stay out of every pool
    pub demo_email_marker: String,
    /// Seconds between scheduled janitor + reconciliation passes; 0 disables the scheduler
    pub reconcile_interval_secs: u64,
    /// TTL of the customer and credential list caches; 0 disables caching
    pub cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_days: parse_env("ENGINE_GRACE_DAYS", 3),
            janitor_buffer_days: parse_env("ENGINE_JANITOR_BUFFER_DAYS", 5),
            default_duration_months: parse_env("ENGINE_DEFAULT_DURATION_MONTHS", 1u32).max(1),
            demo_email_marker: std::env::var("ENGINE_DEMO_EMAIL_MARKER")
                .unwrap_or_else(|_| "demo".to_string()),
            reconcile_interval_secs: parse_env("ENGINE_RECONCILE_INTERVAL_SECS", 300),
            cache_ttl_secs: parse_env("ENGINE_CACHE_TTL_SECS", 30),
        }
    }
}

/// Credential pool health rules
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Provider name (lowercase) to maximum credential age in days
    pub expiry_thresholds: Vec<(String, i64)>,
    pub default_expiry_days: i64,
    /// Service name (lowercase) to maximum assignees; `None` is unlimited
    pub capacity_limits: Vec<(String, Option<usize>)>,
    pub default_capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let thresholds = std::env::var("POOL_EXPIRY_THRESHOLDS")
            .unwrap_or_else(|_| "viki=30,netflix=25,disney=14".to_string());
        let capacities = std::env::var("POOL_CAPACITY_LIMITS").unwrap_or_default();

        Self {
            expiry_thresholds: parse_pairs(&thresholds, |v| {
                v.trim().parse::<i64>().ok().filter(|d| *d > 0)
            }),
            default_expiry_days: parse_env("POOL_DEFAULT_EXPIRY_DAYS", 30),
            capacity_limits: parse_pairs(&capacities, parse_capacity),
            default_capacity: std::env::var("POOL_DEFAULT_CAPACITY")
                .ok()
                .and_then(|v| parse_capacity(&v))
                .unwrap_or(Some(5)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub pool: PoolConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_engine_config_defaults() {
        for var in [
            "ENGINE_GRACE_DAYS",
            "ENGINE_JANITOR_BUFFER_DAYS",
            "ENGINE_DEFAULT_DURATION_MONTHS",
            "ENGINE_DEMO_EMAIL_MARKER",
            "ENGINE_RECONCILE_INTERVAL_SECS",
            "ENGINE_CACHE_TTL_SECS",
        ] {
            std::env::remove_var(var);
        }

        let config = EngineConfig::default();
        assert_eq!(config.grace_days, 3);
        assert_eq!(config.janitor_buffer_days, 5);
        assert_eq!(config.default_duration_months, 1);
        assert_eq!(config.demo_email_marker, "demo");
        assert_eq!(config.reconcile_interval_secs, 300);
        assert_eq!(config.cache_ttl_secs, 30);
    }

    #[test]
    #[serial]
    fn test_engine_config_ignores_unparseable_values() {
        std::env::set_var("ENGINE_GRACE_DAYS", "soon");
        std::env::set_var("ENGINE_DEFAULT_DURATION_MONTHS", "0");
        let config = EngineConfig::default();
        assert_eq!(config.grace_days, 3);
        assert_eq!(config.default_duration_months, 1);
        std::env::remove_var("ENGINE_GRACE_DAYS");
        std::env::remove_var("ENGINE_DEFAULT_DURATION_MONTHS");
    }

    #[test]
    #[serial]
    fn test_pool_config_defaults() {
        std::env::remove_var("POOL_EXPIRY_THRESHOLDS");
        std::env::remove_var("POOL_CAPACITY_LIMITS");
        std::env::remove_var("POOL_DEFAULT_CAPACITY");
        std::env::remove_var("POOL_DEFAULT_EXPIRY_DAYS");

        let config = PoolConfig::default();
        assert_eq!(
            config.expiry_thresholds,
            vec![
                ("viki".to_string(), 30),
                ("netflix".to_string(), 25),
                ("disney".to_string(), 14)
            ]
        );
        assert_eq!(config.default_expiry_days, 30);
        assert!(config.capacity_limits.is_empty());
        assert_eq!(config.default_capacity, Some(5));
    }

    #[test]
    #[serial]
    fn test_pool_config_parses_pairs_and_skips_malformed() {
        std::env::set_var("POOL_EXPIRY_THRESHOLDS", "Viki=20, broken, hbo=x, =4, max=10");
        std::env::set_var("POOL_CAPACITY_LIMITS", "netflix=4,spotify=unlimited,crunchy=0");
        std::env::set_var("POOL_DEFAULT_CAPACITY", "unlimited");

        let config = PoolConfig::default();
        assert_eq!(
            config.expiry_thresholds,
            vec![("viki".to_string(), 20), ("max".to_string(), 10)]
        );
        assert_eq!(
            config.capacity_limits,
            vec![("netflix".to_string(), Some(4)), ("spotify".to_string(), None)]
        );
        assert_eq!(config.default_capacity, None);

        std::env::remove_var("POOL_EXPIRY_THRESHOLDS");
        std::env::remove_var("POOL_CAPACITY_LIMITS");
        std::env::remove_var("POOL_DEFAULT_CAPACITY");
    }

    #[test]
    #[serial]
    fn test_admin_token_from_file() {
        let path = std::env::temp_dir().join("admin-token-test");
        std::fs::write(&path, "  file-token\n").unwrap();
        std::env::set_var("ADMIN_API_TOKEN_FILE", &path);
        std::env::set_var("ADMIN_API_TOKEN", "env-token");

        let config = AdminConfig::default();
        assert_eq!(config.api_token.as_deref(), Some("file-token"));

        std::env::remove_var("ADMIN_API_TOKEN_FILE");
        let config = AdminConfig::default();
        assert_eq!(config.api_token.as_deref(), Some("env-token"));

        std::env::remove_var("ADMIN_API_TOKEN");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    #[serial]
    fn test_admin_config_debug_redacts_token() {
        let config = AdminConfig {
            api_token: Some("super-secret".to_string()),
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret"));
        assert!(debug_output.contains("REDACTED"));
    }

    #[test]
    #[serial]
    fn test_logging_module_levels() {
        std::env::set_var("LOG_MODULE_DATABASE", "debug");
        std::env::remove_var("LOG_MODULE_API");
        let config = LoggingConfig::default();
        assert_eq!(config.modules.get("database").map(String::as_str), Some("debug"));
        assert!(!config.modules.contains_key("api"));
        std::env::remove_var("LOG_MODULE_DATABASE");
    }
}
