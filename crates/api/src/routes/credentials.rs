use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use services::{credential::NewCredential, CredentialId};

use crate::{error::ApiError, models::*, state::AppState};

/// Publish a credential into its service pool
#[utoipa::path(
    post,
    path = "/v1/admin/credentials",
    tag = "Credentials",
    request_body = PublishCredentialRequest,
    responses(
        (status = 201, description = "Credential published", body = CredentialResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn publish_credential(
    State(app_state): State<AppState>,
    Json(request): Json<PublishCredentialRequest>,
) -> Result<(StatusCode, Json<CredentialResponse>), ApiError> {
    let credential = app_state
        .credential_service
        .publish_credential(NewCredential {
            service: request.service,
            secret_email: request.secret_email,
            secret_password: request.secret_password,
            visible: request.visible.unwrap_or(true),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(credential.into())))
}

/// Replace the secret of a credential
///
/// A changed secret mints a new version; customers are notified on their next read.
#[utoipa::path(
    post,
    path = "/v1/admin/credentials/{id}/rotate",
    tag = "Credentials",
    params(("id" = CredentialId, Path, description = "Credential id")),
    request_body = RotateSecretRequest,
    responses(
        (status = 200, description = "Secret rotated", body = CredentialResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Credential not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn rotate_secret(
    State(app_state): State<AppState>,
    Path(id): Path<CredentialId>,
    Json(request): Json<RotateSecretRequest>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = app_state
        .credential_service
        .rotate_secret(id, request.secret_email, request.secret_password)
        .await?;
    Ok(Json(credential.into()))
}

/// Show or hide a credential
#[utoipa::path(
    patch,
    path = "/v1/admin/credentials/{id}",
    tag = "Credentials",
    params(("id" = CredentialId, Path, description = "Credential id")),
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Visibility updated", body = CredentialResponse),
        (status = 404, description = "Credential not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn set_visibility(
    State(app_state): State<AppState>,
    Path(id): Path<CredentialId>,
    Json(request): Json<VisibilityRequest>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let credential = app_state
        .credential_service
        .set_visibility(id, request.visible)
        .await?;
    Ok(Json(credential.into()))
}

/// Delete a credential
///
/// Its assignees move to the remaining pool members on the next pass.
#[utoipa::path(
    delete,
    path = "/v1/admin/credentials/{id}",
    tag = "Credentials",
    params(("id" = CredentialId, Path, description = "Credential id")),
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 404, description = "Credential not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn delete_credential(
    State(app_state): State<AppState>,
    Path(id): Path<CredentialId>,
) -> Result<StatusCode, ApiError> {
    app_state.credential_service.delete_credential(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ordered pool of a service with assignee counts and health
#[utoipa::path(
    get,
    path = "/v1/admin/pools/{service}",
    tag = "Credentials",
    params(("service" = String, Path, description = "Service name, matched fuzzily")),
    responses(
        (status = 200, description = "Pool health", body = PoolResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn get_pool(
    State(app_state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<PoolResponse>, ApiError> {
    let reports = app_state.credential_service.pool_health(&service).await?;
    Ok(Json(PoolResponse {
        service,
        credentials: reports.into_iter().map(Into::into).collect(),
    }))
}

pub fn create_credentials_router() -> Router<AppState> {
    Router::new()
        .route("/credentials", post(publish_credential))
        .route(
            "/credentials/{id}",
            patch(set_visibility).delete(delete_credential),
        )
        .route("/credentials/{id}/rotate", post(rotate_secret))
        .route("/pools/{service}", get(get_pool))
}
