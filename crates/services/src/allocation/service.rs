use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::allocator::{Allocator, Assignment};
use super::ports::{AllocationError, AllocationService, CustomerAssignment};
use crate::credential::{Credential, CredentialRepository, PoolPolicy};
use crate::customer::{AcknowledgmentMap, Customer, CustomerRepository};
use crate::subscription::ExpiryPolicy;
use crate::types::CustomerId;

/// Configuration for AllocationServiceImpl
pub struct AllocationServiceConfig {
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub credential_repo: Arc<dyn CredentialRepository>,
    pub pool_policy: PoolPolicy,
    pub expiry_policy: ExpiryPolicy,
}

pub struct AllocationServiceImpl {
    customer_repo: Arc<dyn CustomerRepository>,
    credential_repo: Arc<dyn CredentialRepository>,
    pool_policy: PoolPolicy,
    expiry_policy: ExpiryPolicy,
}

/// Consistent read of everything allocation depends on
struct AllocationView {
    customer: Customer,
    customers: Vec<Customer>,
    credentials: Vec<Credential>,
}

impl AllocationServiceImpl {
    pub fn new(config: AllocationServiceConfig) -> Self {
        Self {
            customer_repo: config.customer_repo,
            credential_repo: config.credential_repo,
            pool_policy: config.pool_policy,
            expiry_policy: config.expiry_policy,
        }
    }

    /// The customer row is a point lookup while the ranking comes from the list read,
    /// which may lag behind (cached). A customer missing from the list takes the hash path.
    async fn load_view(&self, customer_id: CustomerId) -> Result<AllocationView, AllocationError> {
        let customer = self
            .customer_repo
            .get_customer(customer_id)
            .await?
            .ok_or(AllocationError::CustomerNotFound)?;
        let customers = self.customer_repo.list_customers().await?;
        let credentials = self.credential_repo.list_credentials().await?;

        Ok(AllocationView {
            customer,
            customers,
            credentials,
        })
    }

    fn resolve(
        &self,
        allocator: &mut Allocator<'_>,
        customer: &Customer,
        service: &str,
    ) -> Result<Assignment, AllocationError> {
        if let Some(warning) = allocator.check_consistency(customer, service) {
            tracing::warn!(
                customer_id = %warning.customer_id,
                service = %warning.service,
                rank_index = warning.rank_index,
                hash_index = warning.hash_index,
                "Rank and hash assignment disagree; using rank assignment"
            );
        }

        allocator
            .assign(customer, service)
            .ok_or_else(|| AllocationError::Unserviced {
                service: service.to_string(),
            })
    }
}

#[async_trait]
impl AllocationService for AllocationServiceImpl {
    async fn assign(
        &self,
        customer_id: CustomerId,
        service: &str,
    ) -> Result<Assignment, AllocationError> {
        let view = self.load_view(customer_id).await?;
        let mut allocator = Allocator::new(&view.customers, &view.credentials, &self.pool_policy);
        let assignment = self.resolve(&mut allocator, &view.customer, service)?;

        tracing::debug!(
            customer_id = %customer_id,
            service = %service,
            credential_id = %assignment.credential.id,
            pool_index = assignment.pool_index,
            "Resolved credential assignment"
        );
        Ok(assignment)
    }

    async fn customer_assignments(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CustomerAssignment>, AllocationError> {
        let view = self.load_view(customer_id).await?;
        let now = Utc::now();
        let customer = &view.customer;
        let mut allocator = Allocator::new(&view.customers, &view.credentials, &self.pool_policy);

        let assignments = customer
            .subscriptions
            .iter()
            .map(|subscription| {
                let status =
                    self.expiry_policy
                        .evaluate(subscription, customer.override_expiration, now);
                let assignment = allocator.assign(customer, &subscription.service_name);
                let notice_due = match &assignment {
                    Some(a) if status.state.has_access() => customer
                        .acknowledgments
                        .is_notice_due(&subscription.service_name, a.credential.published_at),
                    _ => false,
                };

                CustomerAssignment {
                    subscription: subscription.clone(),
                    status,
                    assignment,
                    notice_due,
                }
            })
            .collect();

        Ok(assignments)
    }

    async fn is_notice_due(
        &self,
        customer_id: CustomerId,
        service: &str,
    ) -> Result<bool, AllocationError> {
        let view = self.load_view(customer_id).await?;
        let customer = &view.customer;
        let subscription = customer
            .subscription_for(service)
            .ok_or_else(|| AllocationError::SubscriptionNotFound(service.to_string()))?;

        let status = self
            .expiry_policy
            .evaluate(subscription, customer.override_expiration, Utc::now());
        if !status.state.has_access() {
            return Ok(false);
        }

        let mut allocator = Allocator::new(&view.customers, &view.credentials, &self.pool_policy);
        let assignment = self.resolve(&mut allocator, customer, &subscription.service_name)?;

        Ok(customer
            .acknowledgments
            .is_notice_due(&subscription.service_name, assignment.credential.published_at))
    }

    async fn acknowledge(
        &self,
        customer_id: CustomerId,
        services: &[String],
    ) -> Result<AcknowledgmentMap, AllocationError> {
        let view = self.load_view(customer_id).await?;
        let customer = &view.customer;
        let mut allocator = Allocator::new(&view.customers, &view.credentials, &self.pool_policy);

        let mut acknowledgments = customer.acknowledgments.clone();
        let mut changed = false;
        for service in services {
            let subscription = customer
                .subscription_for(service)
                .ok_or_else(|| AllocationError::SubscriptionNotFound(service.clone()))?;
            let assignment = allocator
                .assign(customer, &subscription.service_name)
                .ok_or_else(|| AllocationError::Unserviced {
                    service: service.clone(),
                })?;
            changed |= acknowledgments
                .acknowledge(&subscription.service_name, assignment.credential.published_at);
        }

        if changed {
            self.customer_repo
                .update_acknowledgments(customer_id, &acknowledgments)
                .await?;
            tracing::info!(
                customer_id = %customer_id,
                services = services.len(),
                "Acknowledged credential versions"
            );
        }

        Ok(acknowledgments)
    }
}
