use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use services::{
    allocation::AllocationError, credential::CredentialError, customer::CustomerError,
    janitor::JanitorError, reconciliation::ReconciliationError,
};
use utoipa::ToSchema;

/// Structured error response returned to API consumers
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Convenient wrapper type for API errors that combines status code with error response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Add optional details to the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.response.details = Some(details.into());
        self
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// 401 Unauthorized
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 409 Conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    /// 500 Internal Server Error
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_server_error",
            message,
        )
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "service_unavailable",
            message,
        )
    }

    /// Missing authorization header
    pub fn missing_auth_header() -> Self {
        Self::unauthorized("Missing authorization header")
            .with_details("Request must include an Authorization header with a Bearer token")
    }

    /// Invalid authorization header format
    pub fn invalid_auth_header() -> Self {
        Self::unauthorized("Invalid authorization header format")
            .with_details("Authorization header must be in the format: 'Bearer <token>'")
    }

    /// Token does not match the configured admin token
    pub fn invalid_token() -> Self {
        Self::unauthorized("Invalid admin token")
    }

    /// No admin token configured; every admin route is closed
    pub fn admin_disabled() -> Self {
        Self::service_unavailable("Admin API is disabled")
            .with_details("Set ADMIN_API_TOKEN to enable the admin API")
    }

    /// Pool for the service holds no eligible credential
    pub fn unserviced(service: &str) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "unserviced",
            format!("No credential available for service '{service}'"),
        )
    }
}

/// Implement IntoResponse so ApiError can be returned directly from handlers
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

/// Convert from anyhow::Error for convenience in services
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_server_error("An internal error occurred")
    }
}

impl From<CustomerError> for ApiError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::NotFound => Self::not_found("Customer not found"),
            CustomerError::SubscriptionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "subscription_not_found", err.to_string())
            }
            CustomerError::DuplicateSubscription(_) => Self::conflict(err.to_string()),
            CustomerError::InvalidInput(message) => Self::bad_request(message),
            CustomerError::Repository(message) => {
                tracing::error!("Customer repository error: {}", message);
                Self::internal_server_error("Failed to access customer store")
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotFound => Self::not_found("Credential not found"),
            CredentialError::InvalidInput(message) => Self::bad_request(message),
            CredentialError::Repository(message) => {
                tracing::error!("Credential repository error: {}", message);
                Self::internal_server_error("Failed to access credential store")
            }
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Unserviced { service } => Self::unserviced(&service),
            AllocationError::CustomerNotFound => Self::not_found("Customer not found"),
            AllocationError::SubscriptionNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "subscription_not_found", err.to_string())
            }
            AllocationError::Repository(message) => {
                tracing::error!("Allocation repository error: {}", message);
                Self::internal_server_error("Failed to resolve assignment")
            }
        }
    }
}

impl From<ReconciliationError> for ApiError {
    fn from(err: ReconciliationError) -> Self {
        let ReconciliationError::Persistence(message) = err;
        tracing::error!("Reconciliation failed: {}", message);
        Self::service_unavailable("Reconciliation pass failed")
            .with_details("The next pass retries with fresh state")
    }
}

impl From<JanitorError> for ApiError {
    fn from(err: JanitorError) -> Self {
        let JanitorError::Persistence(message) = err;
        tracing::error!("Janitor pass failed: {}", message);
        Self::service_unavailable("Janitor pass failed")
            .with_details("The next pass retries with fresh state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_error() {
        let err = ApiError::bad_request("Invalid input");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.response.code, "bad_request");
        assert_eq!(err.response.message, "Invalid input");
        assert!(err.response.details.is_none());
    }

    #[test]
    fn test_error_with_details() {
        let err = ApiError::unauthorized("Access denied").with_details("Token expired");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.response.details, Some("Token expired".to_string()));
    }

    #[test]
    fn test_unserviced_maps_to_conflict() {
        let err = ApiError::from(AllocationError::Unserviced {
            service: "Disney".to_string(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.response.code, "unserviced");
        assert!(err.response.message.contains("Disney"));
    }

    #[test]
    fn test_repository_errors_hide_details() {
        let err = ApiError::from(CustomerError::Repository("connection refused".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.response.message.contains("connection refused"));
    }

    #[test]
    fn test_persistence_failures_are_retryable() {
        let err = ApiError::from(ReconciliationError::Persistence("disk full".to_string()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.response.details.is_some());
    }
}
