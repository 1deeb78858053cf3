use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Credential Pool Admin API",
        description = "Allocation, rotation and lifecycle management of shared service credentials.",
        version = "1.0.0",
        license(name = "MIT",)
    ),
    paths(
        crate::routes::health_check,
        // Customer endpoints
        crate::routes::customers::get_customer,
        crate::routes::customers::get_assignments,
        crate::routes::customers::acknowledge,
        crate::routes::customers::add_subscription,
        crate::routes::customers::renew_subscription,
        crate::routes::customers::adjust_subscription,
        crate::routes::customers::set_tolerance,
        crate::routes::customers::cancel_subscription,
        crate::routes::customers::set_observation,
        crate::routes::customers::record_charge,
        // Credential endpoints
        crate::routes::credentials::publish_credential,
        crate::routes::credentials::rotate_secret,
        crate::routes::credentials::set_visibility,
        crate::routes::credentials::delete_credential,
        crate::routes::credentials::get_pool,
        // Audit and maintenance endpoints
        crate::routes::audit::list_exit_events,
        crate::routes::audit::run_reconciliation,
        crate::routes::audit::run_janitor,
    ),
    components(schemas(
        crate::routes::HealthResponse,
        crate::error::ApiErrorResponse,
        crate::models::CustomerResponse,
        crate::models::CustomerAssignmentsResponse,
        crate::models::SubscriptionAssignmentResponse,
        crate::models::AssignedCredentialResponse,
        crate::models::AcknowledgeRequest,
        crate::models::AcknowledgmentsResponse,
        crate::models::AddSubscriptionRequest,
        crate::models::RenewSubscriptionRequest,
        crate::models::AdjustSubscriptionRequest,
        crate::models::ToleranceRequest,
        crate::models::ObservationRequest,
        crate::models::RecordChargeRequest,
        crate::models::CredentialResponse,
        crate::models::PublishCredentialRequest,
        crate::models::RotateSecretRequest,
        crate::models::VisibilityRequest,
        crate::models::PoolCredentialResponse,
        crate::models::PoolResponse,
        crate::models::ExitEventsResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Customers", description = "Subscriptions, assignments and acknowledgments"),
        (name = "Credentials", description = "Credential publishing, rotation and pool health"),
        (name = "Audit", description = "Exit events recorded by reconciliation"),
        (name = "Maintenance", description = "On-demand janitor and reconciliation passes")
    )
)]
pub struct ApiDoc;

/// Security scheme addon for the admin bearer token
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Static admin token from ADMIN_API_TOKEN"))
                        .build(),
                ),
            )
        }
    }
}
