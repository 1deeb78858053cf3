use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use services::{customer::ChargeEntry, subscription::SubscriptionRecord, CustomerId};

use crate::{error::ApiError, models::*, state::AppState};

/// Get a customer
#[utoipa::path(
    get,
    path = "/v1/admin/customers/{id}",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer found", body = CustomerResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Customer not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn get_customer(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state.customer_service.get_customer(id).await?;
    Ok(Json(customer.into()))
}

/// Current assignment of every subscription of a customer
///
/// Each entry carries the access state, the assigned credential (absent when the
/// service pool is empty) and whether a rotation notice is due.
#[utoipa::path(
    get,
    path = "/v1/admin/customers/{id}/assignments",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Assignments resolved", body = CustomerAssignmentsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Customer not found", body = crate::error::ApiErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn get_assignments(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<CustomerAssignmentsResponse>, ApiError> {
    let assignments = app_state
        .allocation_service
        .customer_assignments(id)
        .await?;

    Ok(Json(CustomerAssignmentsResponse {
        customer_id: id,
        assignments: assignments.into_iter().map(Into::into).collect(),
    }))
}

/// Acknowledge the current credential of several services at once
///
/// All-or-nothing: an unknown or unserviced service rejects the whole batch.
#[utoipa::path(
    post,
    path = "/v1/admin/customers/{id}/acknowledgments",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    request_body = AcknowledgeRequest,
    responses(
        (status = 200, description = "Acknowledgments recorded", body = AcknowledgmentsResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Customer or subscription not found", body = crate::error::ApiErrorResponse),
        (status = 409, description = "Service has no credential", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn acknowledge(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<AcknowledgmentsResponse>, ApiError> {
    if request.services.is_empty() {
        return Err(ApiError::bad_request("services cannot be empty"));
    }

    let acknowledgments = app_state
        .allocation_service
        .acknowledge(id, &request.services)
        .await?;

    Ok(Json(AcknowledgmentsResponse {
        customer_id: id,
        acknowledgments,
    }))
}

/// Add a subscription
#[utoipa::path(
    post,
    path = "/v1/admin/customers/{id}/subscriptions",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    request_body = AddSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription added", body = CustomerResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Customer not found", body = crate::error::ApiErrorResponse),
        (status = 409, description = "Customer already subscribes to the service", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn add_subscription(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(request): Json<AddSubscriptionRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let mut record = SubscriptionRecord::new(
        request.service_name,
        request.start_date.unwrap_or_else(Utc::now),
        request
            .duration_months
            .unwrap_or(app_state.default_duration_months),
    );
    record.paid = request.paid.unwrap_or(true);

    let customer = app_state.customer_service.add_subscription(id, record).await?;
    Ok(Json(customer.into()))
}

/// Renew a subscription from `max(expiry, now)`
#[utoipa::path(
    post,
    path = "/v1/admin/customers/{id}/subscriptions/{service}/renew",
    tag = "Customers",
    params(
        ("id" = CustomerId, Path, description = "Customer id"),
        ("service" = String, Path, description = "Service name, matched fuzzily")
    ),
    request_body = RenewSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription renewed", body = CustomerResponse),
        (status = 404, description = "Customer or subscription not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn renew_subscription(
    State(app_state): State<AppState>,
    Path((id, service)): Path<(CustomerId, String)>,
    Json(request): Json<RenewSubscriptionRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state
        .customer_service
        .renew_subscription(id, &service, request.duration_months)
        .await?;
    Ok(Json(customer.into()))
}

/// Shift the start date of a subscription by a number of days
#[utoipa::path(
    post,
    path = "/v1/admin/customers/{id}/subscriptions/{service}/adjust",
    tag = "Customers",
    params(
        ("id" = CustomerId, Path, description = "Customer id"),
        ("service" = String, Path, description = "Service name, matched fuzzily")
    ),
    request_body = AdjustSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription adjusted", body = CustomerResponse),
        (status = 404, description = "Customer or subscription not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn adjust_subscription(
    State(app_state): State<AppState>,
    Path((id, service)): Path<(CustomerId, String)>,
    Json(request): Json<AdjustSubscriptionRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state
        .customer_service
        .adjust_subscription_days(id, &service, request.days)
        .await?;
    Ok(Json(customer.into()))
}

/// Set or clear the tolerance date of a subscription
#[utoipa::path(
    put,
    path = "/v1/admin/customers/{id}/subscriptions/{service}/tolerance",
    tag = "Customers",
    params(
        ("id" = CustomerId, Path, description = "Customer id"),
        ("service" = String, Path, description = "Service name, matched fuzzily")
    ),
    request_body = ToleranceRequest,
    responses(
        (status = 200, description = "Tolerance updated", body = CustomerResponse),
        (status = 404, description = "Customer or subscription not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn set_tolerance(
    State(app_state): State<AppState>,
    Path((id, service)): Path<(CustomerId, String)>,
    Json(request): Json<ToleranceRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state
        .customer_service
        .set_tolerance(id, &service, request.until)
        .await?;
    Ok(Json(customer.into()))
}

/// Cancel a subscription
#[utoipa::path(
    delete,
    path = "/v1/admin/customers/{id}/subscriptions/{service}",
    tag = "Customers",
    params(
        ("id" = CustomerId, Path, description = "Customer id"),
        ("service" = String, Path, description = "Service name, matched fuzzily")
    ),
    responses(
        (status = 200, description = "Subscription removed", body = CustomerResponse),
        (status = 404, description = "Customer or subscription not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    Path((id, service)): Path<(CustomerId, String)>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state
        .customer_service
        .cancel_subscription(id, &service)
        .await?;
    Ok(Json(customer.into()))
}

/// Replace the operator note of a customer
#[utoipa::path(
    put,
    path = "/v1/admin/customers/{id}/observation",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    request_body = ObservationRequest,
    responses(
        (status = 200, description = "Observation updated", body = CustomerResponse),
        (status = 404, description = "Customer not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn set_observation(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(request): Json<ObservationRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = app_state
        .customer_service
        .set_observation(id, request.text)
        .await?;
    Ok(Json(customer.into()))
}

/// Append a charge to the customer's charge log
#[utoipa::path(
    post,
    path = "/v1/admin/customers/{id}/charges",
    tag = "Customers",
    params(("id" = CustomerId, Path, description = "Customer id")),
    request_body = RecordChargeRequest,
    responses(
        (status = 200, description = "Charge recorded", body = CustomerResponse),
        (status = 400, description = "Bad request", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Customer not found", body = crate::error::ApiErrorResponse)
    ),
    security(("admin_token" = []))
)]
pub async fn record_charge(
    State(app_state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(request): Json<RecordChargeRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let entry = ChargeEntry {
        service_name: request.service_name,
        amount_minor: request.amount_minor,
        currency: request.currency,
        charged_at: request.charged_at.unwrap_or_else(Utc::now),
        reference: request.reference,
    };
    let customer = app_state.customer_service.record_charge(id, entry).await?;
    Ok(Json(customer.into()))
}

pub fn create_customers_router() -> Router<AppState> {
    Router::new()
        .route("/customers/{id}", get(get_customer))
        .route("/customers/{id}/assignments", get(get_assignments))
        .route("/customers/{id}/acknowledgments", post(acknowledge))
        .route("/customers/{id}/subscriptions", post(add_subscription))
        .route(
            "/customers/{id}/subscriptions/{service}",
            delete(cancel_subscription),
        )
        .route(
            "/customers/{id}/subscriptions/{service}/renew",
            post(renew_subscription),
        )
        .route(
            "/customers/{id}/subscriptions/{service}/adjust",
            post(adjust_subscription),
        )
        .route(
            "/customers/{id}/subscriptions/{service}/tolerance",
            put(set_tolerance),
        )
        .route("/customers/{id}/observation", put(set_observation))
        .route("/customers/{id}/charges", post(record_charge))
}
