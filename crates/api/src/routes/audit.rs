use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use services::{
    credential::VersionKey, janitor::JanitorReport, reconciliation::ReconciliationReport,
    CredentialId,
};

use crate::{error::ApiError, models::*, state::AppState};

/// Exactly one filter must be given
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ExitEventsQuery {
    /// Single credential version (`<credential id>@<published at>`)
    pub version_key: Option<String>,
    /// Every version of a credential
    pub credential_id: Option<CredentialId>,
}

/// Exit events recorded by reconciliation
#[utoipa::path(
    get,
    path = "/v1/admin/exit-events",
    tag = "Audit",
    params(ExitEventsQuery),
    responses(
        (status = 200, description = "Exit events", body = ExitEventsResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 503, description = "Audit state unavailable", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn list_exit_events(
    State(app_state): State<AppState>,
    Query(query): Query<ExitEventsQuery>,
) -> Result<Json<ExitEventsResponse>, ApiError> {
    let events = match (query.version_key, query.credential_id) {
        (Some(version_key), None) => {
            app_state
                .reconciliation_service
                .exit_events_for_version(&VersionKey::from(version_key))
                .await?
        }
        (None, Some(credential_id)) => {
            app_state
                .reconciliation_service
                .exit_events_for_credential(credential_id)
                .await?
        }
        _ => {
            return Err(ApiError::bad_request(
                "Exactly one of version_key or credential_id is required",
            ))
        }
    };

    Ok(Json(ExitEventsResponse { events }))
}

/// Run a reconciliation pass now
#[utoipa::path(
    post,
    path = "/v1/admin/maintenance/reconcile",
    tag = "Maintenance",
    responses(
        (status = 200, description = "Pass finished", body = ReconciliationReport),
        (status = 503, description = "Pass failed; the next one retries", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn run_reconciliation(
    State(app_state): State<AppState>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    tracing::info!("Manual reconciliation pass requested");
    let report = app_state.reconciliation_service.run_pass().await?;
    Ok(Json(report))
}

/// Run a janitor pass now, then reconcile if it changed anything
#[utoipa::path(
    post,
    path = "/v1/admin/maintenance/janitor",
    tag = "Maintenance",
    responses(
        (status = 200, description = "Pass finished", body = JanitorReport),
        (status = 503, description = "Pass failed; the next one retries", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn run_janitor(
    State(app_state): State<AppState>,
) -> Result<Json<JanitorReport>, ApiError> {
    tracing::info!("Manual janitor pass requested");
    let report = app_state.janitor_service.run_pass().await?;
    if report.changed() {
        app_state.reconciliation_trigger.trigger().await;
    }
    Ok(Json(report))
}

pub fn create_audit_router() -> Router<AppState> {
    Router::new()
        .route("/exit-events", get(list_exit_events))
        .route("/maintenance/reconcile", post(run_reconciliation))
        .route("/maintenance/janitor", post(run_janitor))
}
