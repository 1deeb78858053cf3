pub mod audit;
pub mod credentials;
pub mod customers;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// API version
    pub version: &'static str,
}

/// Health check endpoint
///
/// Returns the health status of the engine. Does not touch the store.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Create the main API router; everything under `/v1/admin` requires the admin token
pub fn create_router(app_state: AppState) -> Router {
    let admin_routes = Router::new()
        .merge(customers::create_customers_router())
        .merge(credentials::create_credentials_router())
        .merge(audit::create_audit_router())
        .layer(from_fn_with_state(
            app_state.clone(),
            crate::middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1/admin", admin_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
