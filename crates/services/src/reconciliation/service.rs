use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

use super::auditor::{current_assignments, current_signature, exit_events, next_snapshot, record_exits};
use super::ports::{
    AuditStateRepository, ExitEvent, ReconciliationError, ReconciliationReport,
    ReconciliationService,
};
use crate::credential::{CredentialRepository, PoolPolicy, VersionKey};
use crate::customer::CustomerRepository;
use crate::subscription::ExpiryPolicy;
use crate::types::CredentialId;

/// Configuration for ReconciliationServiceImpl
pub struct ReconciliationServiceConfig {
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub credential_repo: Arc<dyn CredentialRepository>,
    pub audit_repo: Arc<dyn AuditStateRepository>,
    pub pool_policy: PoolPolicy,
    pub expiry_policy: ExpiryPolicy,
}

/// Snapshot diffing and exit-event bookkeeping.
///
/// Passes are serialized through `pass_lock`. Reads and writes of a pass are not
/// isolated from other writers of the store: a concurrent external write between
/// the load and the save can be overwritten, and the next pass picks it up again.
pub struct ReconciliationServiceImpl {
    customer_repo: Arc<dyn CustomerRepository>,
    credential_repo: Arc<dyn CredentialRepository>,
    audit_repo: Arc<dyn AuditStateRepository>,
    pool_policy: PoolPolicy,
    expiry_policy: ExpiryPolicy,
    pass_lock: tokio::sync::Mutex<()>,
    /// (previous, current) signatures of the last pass that completed
    last_signatures: Mutex<Option<(String, String)>>,
}

impl ReconciliationServiceImpl {
    pub fn new(config: ReconciliationServiceConfig) -> Self {
        Self {
            customer_repo: config.customer_repo,
            credential_repo: config.credential_repo,
            audit_repo: config.audit_repo,
            pool_policy: config.pool_policy,
            expiry_policy: config.expiry_policy,
            pass_lock: tokio::sync::Mutex::new(()),
            last_signatures: Mutex::new(None),
        }
    }

    fn already_processed(&self, pair: &(String, String)) -> bool {
        self.last_signatures
            .lock()
            .map(|last| last.as_ref() == Some(pair))
            .unwrap_or(false)
    }

    fn remember(&self, pair: (String, String)) {
        if let Ok(mut last) = self.last_signatures.lock() {
            *last = Some(pair);
        }
    }

    async fn pass(&self) -> Result<ReconciliationReport, ReconciliationError> {
        let now = Utc::now();
        let customers = self.customer_repo.list_customers().await?;
        let credentials = self.credential_repo.list_credentials().await?;

        let current = current_assignments(&customers, &credentials, &self.pool_policy, now);
        let previous = self.audit_repo.load_snapshot().await?;

        let pair = (previous.signature(), current_signature(&current));
        if self.already_processed(&pair) {
            tracing::debug!(
                associations = current.len(),
                "Assignment signatures unchanged, skipping reconciliation"
            );
            return Ok(ReconciliationReport {
                short_circuited: true,
                associations: current.len(),
                ..Default::default()
            });
        }

        let events = exit_events(&previous, &current, &customers, &self.expiry_policy, now);
        let mut history = self.audit_repo.load_exit_history().await?;
        let exits_emitted = record_exits(&mut history, events);

        let history_written = exits_emitted > 0;
        if history_written {
            self.audit_repo.save_exit_history(&history).await?;
        }

        let next = next_snapshot(&previous, &current, now);
        let snapshot_written = next != previous;
        if snapshot_written {
            self.audit_repo.save_snapshot(&next).await?;
        }

        self.remember(pair);

        Ok(ReconciliationReport {
            short_circuited: false,
            associations: next.len(),
            exits_emitted,
            snapshot_written,
            history_written,
        })
    }
}

#[async_trait]
impl ReconciliationService for ReconciliationServiceImpl {
    async fn run_pass(&self) -> Result<ReconciliationReport, ReconciliationError> {
        let _guard = self.pass_lock.lock().await;

        match self.pass().await {
            Ok(report) => {
                if !report.short_circuited {
                    tracing::info!(
                        associations = report.associations,
                        exits_emitted = report.exits_emitted,
                        snapshot_written = report.snapshot_written,
                        history_written = report.history_written,
                        "Reconciliation pass completed"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = ?e, "Reconciliation pass failed, waiting for next cycle");
                Err(e)
            }
        }
    }

    async fn exit_events_for_version(
        &self,
        version_key: &VersionKey,
    ) -> Result<Vec<ExitEvent>, ReconciliationError> {
        let history = self.audit_repo.load_exit_history().await?;
        Ok(history.for_version(version_key))
    }

    async fn exit_events_for_credential(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<ExitEvent>, ReconciliationError> {
        let history = self.audit_repo.load_exit_history().await?;
        Ok(history.for_credential(credential_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationService, AllocationServiceConfig, AllocationServiceImpl};
    use crate::credential::Credential;
    use crate::customer::Customer;
    use crate::reconciliation::ExitReason;
    use crate::subscription::SubscriptionRecord;
    use crate::test_helpers::{
        InMemoryAuditStateRepository, InMemoryCredentialRepository, InMemoryCustomerRepository,
    };
    use chrono::{DateTime, Duration};

    struct Fixture {
        customers: Arc<InMemoryCustomerRepository>,
        credentials: Arc<InMemoryCredentialRepository>,
        audit: Arc<InMemoryAuditStateRepository>,
        service: ReconciliationServiceImpl,
    }

    fn fixture() -> Fixture {
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let credentials = Arc::new(InMemoryCredentialRepository::default());
        let audit = Arc::new(InMemoryAuditStateRepository::default());
        let service = ReconciliationServiceImpl::new(ReconciliationServiceConfig {
            customer_repo: customers.clone(),
            credential_repo: credentials.clone(),
            audit_repo: audit.clone(),
            pool_policy: PoolPolicy::default(),
            expiry_policy: ExpiryPolicy::default(),
        });
        Fixture {
            customers,
            credentials,
            audit,
            service,
        }
    }

    fn credential(service: &str, published_at: DateTime<Utc>) -> Credential {
        Credential {
            id: CredentialId::new(),
            service: service.to_string(),
            secret_email: "shared@example.com".to_string(),
            secret_password: "secret".to_string(),
            published_at,
            visible: true,
            created_at: published_at,
            updated_at: published_at,
        }
    }

    fn subscribed(phone: &str, service: &str) -> Customer {
        let mut customer = Customer::new(phone, "Test");
        customer.subscriptions.push(SubscriptionRecord::new(
            service,
            Utc::now() - Duration::days(2),
            1,
        ));
        customer
    }

    #[tokio::test]
    async fn test_first_pass_writes_snapshot_only() {
        let fx = fixture();
        fx.customers.insert(subscribed("3001", "Viki Pass"));
        fx.credentials
            .insert(credential("Viki Pass", Utc::now() - Duration::days(5)));

        let report = fx.service.run_pass().await.unwrap();
        assert!(!report.short_circuited);
        assert_eq!(report.associations, 1);
        assert_eq!(report.exits_emitted, 0);
        assert!(report.snapshot_written);
        assert!(!report.history_written);
        assert_eq!(fx.audit.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_state_short_circuits() {
        let fx = fixture();
        fx.customers.insert(subscribed("3001", "Viki Pass"));
        fx.credentials
            .insert(credential("Viki Pass", Utc::now() - Duration::days(5)));

        fx.service.run_pass().await.unwrap();
        let second = fx.service.run_pass().await.unwrap();
        assert!(!second.short_circuited);
        assert!(!second.snapshot_written);

        // Signature pair now repeats: (snapshot, current) == last processed pair
        let third = fx.service.run_pass().await.unwrap();
        assert!(third.short_circuited);
        assert_eq!(fx.audit.write_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_removed_emits_single_exit_event() {
        let fx = fixture();
        let mut customer = subscribed("3001", "Viki Pass");
        fx.customers.insert(customer.clone());
        let cred = credential("Viki Pass", Utc::now() - Duration::days(5));
        fx.credentials.insert(cred.clone());
        fx.service.run_pass().await.unwrap();

        let removed = customer.subscriptions.remove(0);
        fx.customers.insert(customer.clone());
        let report = fx.service.run_pass().await.unwrap();
        assert_eq!(report.exits_emitted, 1);
        assert!(report.history_written);

        let events = fx
            .service
            .exit_events_for_version(&cred.version_key())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, ExitReason::SubscriptionRemoved);
        assert_eq!(events[0].reason.description(), "subscription removed or changed");

        // Re-adding keeps a fresh assigned_at; the old exit is not duplicated
        customer.subscriptions.push(removed);
        fx.customers.insert(customer);
        fx.service.run_pass().await.unwrap();
        fx.service.run_pass().await.unwrap();

        let events = fx.service.exit_events_for_credential(cred.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(fx.audit.history().len(), 1);
    }

    #[tokio::test]
    async fn test_rotation_notice_then_no_exit_event() {
        let fx = fixture();
        let customer = subscribed("3001", "Viki Pass");
        fx.customers.insert(customer.clone());
        let mut cred = credential("Viki Pass", Utc::now() - Duration::days(5));
        fx.credentials.insert(cred.clone());

        let allocation = AllocationServiceImpl::new(AllocationServiceConfig {
            customer_repo: fx.customers.clone(),
            credential_repo: fx.credentials.clone(),
            pool_policy: PoolPolicy::default(),
            expiry_policy: ExpiryPolicy::default(),
        });
        allocation
            .acknowledge(customer.id, &["Viki Pass".to_string()])
            .await
            .unwrap();
        fx.service.run_pass().await.unwrap();
        let before = fx.audit.snapshot();

        cred.published_at = Utc::now();
        cred.secret_password = "rotated".to_string();
        fx.credentials.insert(cred.clone());

        assert!(allocation.is_notice_due(customer.id, "Viki Pass").await.unwrap());
        let report = fx.service.run_pass().await.unwrap();
        assert_eq!(report.exits_emitted, 0);
        assert!(report.snapshot_written);

        let after = fx.audit.snapshot();
        let (key, old_entry) = before.iter().next().unwrap();
        let new_entry = after.get(key).unwrap();
        assert_ne!(new_entry.version_key, old_entry.version_key);
        assert!(new_entry.assigned_at > old_entry.assigned_at);

        allocation
            .acknowledge(customer.id, &["Viki Pass".to_string()])
            .await
            .unwrap();
        assert!(!allocation.is_notice_due(customer.id, "Viki Pass").await.unwrap());
    }

    #[tokio::test]
    async fn test_trashed_customer_exit_reason() {
        let fx = fixture();
        let mut customer = subscribed("3001", "Viki Pass");
        fx.customers.insert(customer.clone());
        let cred = credential("Viki Pass", Utc::now() - Duration::days(5));
        fx.credentials.insert(cred.clone());
        fx.service.run_pass().await.unwrap();

        customer.deleted = true;
        fx.customers.insert(customer);
        fx.service.run_pass().await.unwrap();

        let events = fx.service.exit_events_for_credential(cred.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, ExitReason::MovedToTrash);
    }

    #[tokio::test]
    async fn test_credential_deleted_exit_reason_is_other() {
        let fx = fixture();
        fx.customers.insert(subscribed("3001", "Viki Pass"));
        let cred = credential("Viki Pass", Utc::now() - Duration::days(5));
        fx.credentials.insert(cred.clone());
        fx.service.run_pass().await.unwrap();

        fx.credentials.remove(cred.id);
        let report = fx.service.run_pass().await.unwrap();
        assert_eq!(report.exits_emitted, 1);
        assert_eq!(report.associations, 0);

        let events = fx.service.exit_events_for_credential(cred.id).await.unwrap();
        assert_eq!(events[0].reason, ExitReason::Other);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_and_next_pass_retries() {
        let fx = fixture();
        fx.customers.insert(subscribed("3001", "Viki Pass"));
        fx.credentials
            .insert(credential("Viki Pass", Utc::now() - Duration::days(5)));

        fx.audit.fail_writes(true);
        let result = fx.service.run_pass().await;
        assert!(matches!(result, Err(ReconciliationError::Persistence(_))));
        assert!(fx.audit.snapshot().is_empty());

        fx.audit.fail_writes(false);
        let report = fx.service.run_pass().await.unwrap();
        assert!(!report.short_circuited);
        assert!(report.snapshot_written);
        assert_eq!(fx.audit.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_exit_event_keys_are_unique() {
        let fx = fixture();
        let a = subscribed("3001", "Viki Pass");
        let b = subscribed("3002", "Viki Pass");
        fx.customers.insert(a.clone());
        fx.customers.insert(b.clone());
        fx.credentials
            .insert(credential("Viki Pass", Utc::now() - Duration::days(5)));
        fx.service.run_pass().await.unwrap();

        fx.customers.remove(a.id);
        fx.customers.remove(b.id);
        fx.service.run_pass().await.unwrap();
        fx.service.run_pass().await.unwrap();

        let history = fx.audit.history();
        assert!(fx.audit.snapshot().is_empty());
        assert_eq!(history.len(), 2);

        let events = history.for_credential(fx.credentials.all()[0].id);
        let mut event_keys: Vec<&str> = events.iter().map(|e| e.event_key.as_str()).collect();
        event_keys.sort_unstable();
        event_keys.dedup();
        assert_eq!(event_keys.len(), 2);
        assert!(events.iter().all(|e| e.reason == ExitReason::RemovedFromStore));
    }
}
