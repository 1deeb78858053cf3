use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::{error::ApiError, state::AppState};

/// Hash an admin token for comparison; the raw token is never kept in state
pub fn hash_admin_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the bearer token from the Authorization header
fn extract_token_from_request(request: &Request) -> Result<&str, ApiError> {
    let auth_value = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("No authorization header found");
            ApiError::missing_auth_header()
        })?;

    auth_value.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Authorization header does not start with 'Bearer '");
        ApiError::invalid_auth_header()
    })
}

/// Admin authentication middleware: the bearer token must hash to the configured one
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    tracing::debug!("Admin auth middleware invoked for {} {}", method, path);

    let Some(expected) = state.admin_token_hash.as_deref() else {
        tracing::warn!("Admin request to {} rejected: no admin token configured", path);
        return Err(ApiError::admin_disabled().into_response());
    };

    let token = extract_token_from_request(&request).map_err(|e| e.into_response())?;
    if hash_admin_token(token) != *expected {
        tracing::warn!("Admin access denied for {} {}: token mismatch", method, path);
        return Err(ApiError::invalid_token().into_response());
    }

    Ok(next.run(request).await)
}
