use std::sync::Arc;

use services::{
    allocation::{AllocationService, AllocationServiceConfig, AllocationServiceImpl},
    credential::{
        Capacity, CredentialRepository, CredentialService, CredentialServiceConfig,
        CredentialServiceImpl, PoolPolicy,
    },
    customer::{CustomerRepository, CustomerService, CustomerServiceImpl},
    janitor::{JanitorService, LifecycleJanitor, LifecycleJanitorConfig},
    reconciliation::{
        AuditStateRepository, CoalescingTrigger, ReconciliationService,
        ReconciliationServiceConfig, ReconciliationServiceImpl, ReconciliationTrigger,
    },
    subscription::ExpiryPolicy,
};

use crate::middleware::hash_admin_token;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub allocation_service: Arc<dyn AllocationService>,
    pub customer_service: Arc<dyn CustomerService>,
    pub credential_service: Arc<dyn CredentialService>,
    pub reconciliation_service: Arc<dyn ReconciliationService>,
    pub janitor_service: Arc<dyn JanitorService>,
    /// Runs a pass after every mutation; shared with the scheduler
    pub reconciliation_trigger: Arc<dyn ReconciliationTrigger>,
    /// SHA-256 of the configured admin token; `None` closes the admin API
    pub admin_token_hash: Option<Arc<String>>,
    /// Applied to new subscriptions that do not name a duration
    pub default_duration_months: u32,
}

/// Store collaborators the engine is built on
#[derive(Clone)]
pub struct EngineRepositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub audit_state: Arc<dyn AuditStateRepository>,
}

fn capacity(value: Option<usize>) -> Capacity {
    match value {
        Some(limit) => Capacity::Limited(limit),
        None => Capacity::Unlimited,
    }
}

/// Pool rules from configuration
pub fn pool_policy(engine: &config::EngineConfig, pool: &config::PoolConfig) -> PoolPolicy {
    PoolPolicy {
        demo_email_marker: engine.demo_email_marker.clone(),
        expiry_thresholds: pool.expiry_thresholds.clone(),
        default_expiry_days: pool.default_expiry_days,
        capacity_limits: pool
            .capacity_limits
            .iter()
            .map(|(service, limit)| (service.clone(), capacity(*limit)))
            .collect(),
        default_capacity: capacity(pool.default_capacity),
    }
}

impl AppState {
    /// Wire every engine service over the given repositories
    pub fn build(repositories: EngineRepositories, config: &config::Config) -> Self {
        let pool_policy = pool_policy(&config.engine, &config.pool);
        let expiry_policy = ExpiryPolicy::new(config.engine.grace_days);

        let reconciliation_service: Arc<dyn ReconciliationService> = Arc::new(
            ReconciliationServiceImpl::new(ReconciliationServiceConfig {
                customer_repo: repositories.customers.clone(),
                credential_repo: repositories.credentials.clone(),
                audit_repo: repositories.audit_state.clone(),
                pool_policy: pool_policy.clone(),
                expiry_policy,
            }),
        );
        let reconciliation_trigger: Arc<dyn ReconciliationTrigger> =
            Arc::new(CoalescingTrigger::new(reconciliation_service.clone()));

        let allocation_service = Arc::new(AllocationServiceImpl::new(AllocationServiceConfig {
            customer_repo: repositories.customers.clone(),
            credential_repo: repositories.credentials.clone(),
            pool_policy: pool_policy.clone(),
            expiry_policy,
        }));

        let customer_service = Arc::new(CustomerServiceImpl::new(
            repositories.customers.clone(),
            reconciliation_trigger.clone(),
        ));

        let credential_service = Arc::new(CredentialServiceImpl::new(CredentialServiceConfig {
            credential_repo: repositories.credentials.clone(),
            customer_repo: repositories.customers.clone(),
            pool_policy,
            trigger: reconciliation_trigger.clone(),
        }));

        let janitor_service = Arc::new(LifecycleJanitor::new(LifecycleJanitorConfig {
            customer_repo: repositories.customers,
            buffer_days: config.engine.janitor_buffer_days,
        }));

        Self {
            allocation_service,
            customer_service,
            credential_service,
            reconciliation_service,
            janitor_service,
            reconciliation_trigger,
            admin_token_hash: config
                .admin
                .api_token
                .as_deref()
                .map(|token| Arc::new(hash_admin_token(token))),
            default_duration_months: config.engine.default_duration_months,
        }
    }
}
