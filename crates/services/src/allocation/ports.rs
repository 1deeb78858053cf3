use async_trait::async_trait;

use super::allocator::Assignment;
use crate::customer::AcknowledgmentMap;
use crate::subscription::{SubscriptionRecord, SubscriptionStatus};
use crate::types::CustomerId;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// Empty pool: a normal outcome for services nobody has stocked yet
    #[error("No credential available for service '{service}'")]
    Unserviced { service: String },
    #[error("Customer not found")]
    CustomerNotFound,
    #[error("Customer has no subscription matching '{0}'")]
    SubscriptionNotFound(String),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<anyhow::Error> for AllocationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Repository(err.to_string())
    }
}

/// Everything the notification side needs about one subscription of a customer
#[derive(Debug, Clone)]
pub struct CustomerAssignment {
    pub subscription: SubscriptionRecord,
    pub status: SubscriptionStatus,
    /// `None` when the service pool is empty
    pub assignment: Option<Assignment>,
    pub notice_due: bool,
}

#[async_trait]
pub trait AllocationService: Send + Sync {
    /// Credential currently assigned to the customer for `service`
    async fn assign(
        &self,
        customer_id: CustomerId,
        service: &str,
    ) -> Result<Assignment, AllocationError>;

    /// One entry per subscription of the customer
    async fn customer_assignments(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CustomerAssignment>, AllocationError>;

    /// True when the assigned credential version is newer than the last acknowledged one
    async fn is_notice_due(
        &self,
        customer_id: CustomerId,
        service: &str,
    ) -> Result<bool, AllocationError>;

    /// Acknowledge the currently assigned version for every service in `services`.
    ///
    /// All-or-nothing: every service is resolved before a single write, and an
    /// unserviced or unknown service fails the whole batch. Newer acknowledgments
    /// already on record are kept.
    async fn acknowledge(
        &self,
        customer_id: CustomerId,
        services: &[String],
    ) -> Result<AcknowledgmentMap, AllocationError>;
}
