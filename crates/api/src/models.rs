use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services::{
    allocation::{AssignmentStrategy, CustomerAssignment},
    credential::{Credential, CredentialHealth, CredentialHealthReport, VersionKey},
    customer::{AcknowledgmentMap, ChargeEntry, Customer, ObservationNote},
    reconciliation::ExitEvent,
    subscription::{SubscriptionRecord, SubscriptionStatus},
    CredentialId, CustomerId,
};
use utoipa::ToSchema;

/// Customer as seen by operators
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: CustomerId,
    pub phone: String,
    pub name: String,
    pub subscriptions: Vec<SubscriptionRecord>,
    pub default_duration_months: Option<u32>,
    pub override_expiration: bool,
    /// Trashed customers keep their history but hold no credential
    pub deleted: bool,
    pub acknowledgments: AcknowledgmentMap,
    pub observation: Option<ObservationNote>,
    pub charge_log: Vec<ChargeEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id,
            phone: customer.phone,
            name: customer.name,
            subscriptions: customer.subscriptions,
            default_duration_months: customer.default_duration_months,
            override_expiration: customer.override_expiration,
            deleted: customer.deleted,
            acknowledgments: customer.acknowledgments,
            observation: customer.observation,
            charge_log: customer.charge_log.entries().to_vec(),
            created_at: customer.created_at,
            updated_at: customer.updated_at,
        }
    }
}

/// Shared login handed to a customer for one service
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignedCredentialResponse {
    pub credential_id: CredentialId,
    pub version_key: VersionKey,
    pub secret_email: String,
    pub secret_password: String,
    pub published_at: DateTime<Utc>,
    pub pool_index: usize,
    pub pool_size: usize,
    pub strategy: AssignmentStrategy,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionAssignmentResponse {
    pub subscription: SubscriptionRecord,
    pub status: SubscriptionStatus,
    /// Absent while the service pool is empty
    pub credential: Option<AssignedCredentialResponse>,
    /// Assigned version is newer than the last one the customer acknowledged
    pub notice_due: bool,
}

impl From<CustomerAssignment> for SubscriptionAssignmentResponse {
    fn from(entry: CustomerAssignment) -> Self {
        Self {
            credential: entry.assignment.map(|assignment| AssignedCredentialResponse {
                credential_id: assignment.credential.id,
                version_key: assignment.credential.version_key(),
                secret_email: assignment.credential.secret_email,
                secret_password: assignment.credential.secret_password,
                published_at: assignment.credential.published_at,
                pool_index: assignment.pool_index,
                pool_size: assignment.pool_size,
                strategy: assignment.strategy,
            }),
            subscription: entry.subscription,
            status: entry.status,
            notice_due: entry.notice_due,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerAssignmentsResponse {
    pub customer_id: CustomerId,
    pub assignments: Vec<SubscriptionAssignmentResponse>,
}

/// Services whose current credential the customer has seen
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcknowledgeRequest {
    pub services: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcknowledgmentsResponse {
    pub customer_id: CustomerId,
    pub acknowledgments: AcknowledgmentMap,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddSubscriptionRequest {
    pub service_name: String,
    /// Defaults to now
    pub start_date: Option<DateTime<Utc>>,
    /// Defaults to the configured duration
    pub duration_months: Option<u32>,
    /// Defaults to true
    pub paid: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RenewSubscriptionRequest {
    /// Keeps the current duration when absent
    pub duration_months: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdjustSubscriptionRequest {
    /// Signed day offset applied to the start date
    pub days: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToleranceRequest {
    /// Access stays open until this date; null clears it
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ObservationRequest {
    /// Blank text clears the note
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordChargeRequest {
    pub service_name: String,
    /// Amount in minor units (cents)
    pub amount_minor: i64,
    pub currency: String,
    /// Defaults to now
    pub charged_at: Option<DateTime<Utc>>,
    pub reference: Option<String>,
}

/// Credential without its password
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CredentialResponse {
    pub id: CredentialId,
    pub service: String,
    pub secret_email: String,
    pub published_at: DateTime<Utc>,
    pub version_key: VersionKey,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Credential> for CredentialResponse {
    fn from(credential: Credential) -> Self {
        Self {
            version_key: credential.version_key(),
            id: credential.id,
            service: credential.service,
            secret_email: credential.secret_email,
            published_at: credential.published_at,
            visible: credential.visible,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishCredentialRequest {
    pub service: String,
    pub secret_email: String,
    pub secret_password: String,
    /// Defaults to true
    pub visible: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RotateSecretRequest {
    /// Keeps the current email when absent
    pub secret_email: Option<String>,
    pub secret_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PoolCredentialResponse {
    pub credential: CredentialResponse,
    pub pool_index: usize,
    pub assignees: usize,
    pub health: CredentialHealth,
}

impl From<CredentialHealthReport> for PoolCredentialResponse {
    fn from(report: CredentialHealthReport) -> Self {
        Self {
            credential: report.credential.into(),
            pool_index: report.pool_index,
            assignees: report.assignees,
            health: report.health,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PoolResponse {
    pub service: String,
    pub credentials: Vec<PoolCredentialResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExitEventsResponse {
    pub events: Vec<ExitEvent>,
}
