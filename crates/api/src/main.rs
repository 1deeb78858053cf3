use api::{create_router, scheduler, ApiDoc, AppState, EngineRepositories};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Global level plus per-crate overrides, unless RUST_LOG is set
fn env_filter(logging: &config::LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![logging.level.clone()];
    let mut modules: Vec<_> = logging.modules.iter().collect();
    modules.sort();
    directives.extend(
        modules
            .into_iter()
            .map(|(module, level)| format!("{module}={level}")),
    );
    EnvFilter::new(directives.join(","))
}

fn init_tracing(logging: &config::LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(logging));
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
        eprintln!("Continuing with environment variables...");
    }

    // Load configuration from environment
    let config = config::Config::from_env();
    init_tracing(&config.logging);

    tracing::info!("Starting credential engine...");
    tracing::info!(
        "Database: {}:{}/{}",
        config.database.host.as_deref().unwrap_or("localhost"),
        config.database.port,
        config.database.database
    );
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    if config.admin.api_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN is not set; admin routes will reject every request");
    }

    // Create database and run migrations
    tracing::info!("Connecting to database...");
    let db = database::Database::from_config(
        &config.database,
        Duration::from_secs(config.engine.cache_ttl_secs),
    )
    .await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    tracing::info!("Initializing services...");
    let app_state = AppState::build(
        EngineRepositories {
            customers: db.customer_repository(),
            credentials: db.credential_repository(),
            audit_state: db.audit_state_repository(),
        },
        &config,
    );

    // Bring the audit snapshot up to date before serving
    if let Err(e) = app_state.reconciliation_service.run_pass().await {
        tracing::error!("Startup reconciliation pass failed: {}", e);
    }

    let _maintenance = scheduler::spawn_maintenance(
        app_state.clone(),
        Duration::from_secs(config.engine.reconcile_interval_secs),
    );

    // Create router
    let app = create_router(app_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
