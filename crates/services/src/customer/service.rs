use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::ports::{
    ChargeEntry, Customer, CustomerError, CustomerRepository, CustomerService, ObservationNote,
};
use crate::reconciliation::ReconciliationTrigger;
use crate::subscription::codec::{
    is_storable_service_name, DateOutOfRange, MAX_ADJUST_DAYS, MAX_DURATION_MONTHS,
};
use crate::subscription::SubscriptionRecord;
use crate::types::CustomerId;

fn validate_duration(months: u32) -> Result<(), CustomerError> {
    if !(1..=MAX_DURATION_MONTHS).contains(&months) {
        return Err(CustomerError::InvalidInput(format!(
            "Duration must be between 1 and {MAX_DURATION_MONTHS} months"
        )));
    }
    Ok(())
}

pub struct CustomerServiceImpl {
    repository: Arc<dyn CustomerRepository>,
    trigger: Arc<dyn ReconciliationTrigger>,
}

impl CustomerServiceImpl {
    pub fn new(
        repository: Arc<dyn CustomerRepository>,
        trigger: Arc<dyn ReconciliationTrigger>,
    ) -> Self {
        Self {
            repository,
            trigger,
        }
    }

    async fn load(&self, id: CustomerId) -> Result<Customer, CustomerError> {
        self.repository
            .get_customer(id)
            .await?
            .ok_or(CustomerError::NotFound)
    }

    /// Apply `change` to the subscription matching `service` and persist the list
    async fn modify_subscription<F>(
        &self,
        id: CustomerId,
        service: &str,
        change: F,
    ) -> Result<Customer, CustomerError>
    where
        F: FnOnce(&mut SubscriptionRecord) -> Result<(), CustomerError> + Send,
    {
        let mut customer = self.load(id).await?;
        let record = customer
            .subscription_for_mut(service)
            .ok_or_else(|| CustomerError::SubscriptionNotFound(service.to_string()))?;
        change(record)?;

        self.repository
            .update_subscriptions(id, &customer.subscriptions)
            .await?;
        self.trigger.trigger().await;
        Ok(customer)
    }
}

#[async_trait]
impl CustomerService for CustomerServiceImpl {
    async fn get_customer(&self, id: CustomerId) -> Result<Customer, CustomerError> {
        self.load(id).await
    }

    async fn add_subscription(
        &self,
        id: CustomerId,
        record: SubscriptionRecord,
    ) -> Result<Customer, CustomerError> {
        if !is_storable_service_name(&record.service_name) {
            return Err(CustomerError::InvalidInput(
                "Service name must be non-empty and cannot contain ';' or '|'".to_string(),
            ));
        }
        validate_duration(record.duration_months)?;
        if record.checked_expiry().is_none() {
            return Err(DateOutOfRange.into());
        }

        let mut customer = self.load(id).await?;
        if customer.has_service(&record.service_name) {
            return Err(CustomerError::DuplicateSubscription(record.service_name));
        }

        tracing::info!(
            customer_id = %id,
            service = %record.service_name,
            duration_months = record.duration_months,
            "Adding subscription"
        );
        customer.subscriptions.push(record);
        self.repository
            .update_subscriptions(id, &customer.subscriptions)
            .await?;
        self.trigger.trigger().await;
        Ok(customer)
    }

    async fn renew_subscription(
        &self,
        id: CustomerId,
        service: &str,
        duration_months: Option<u32>,
    ) -> Result<Customer, CustomerError> {
        if let Some(months) = duration_months {
            validate_duration(months)?;
        }
        let now = Utc::now();
        let customer = self
            .modify_subscription(id, service, |record| {
                record
                    .renew(now, duration_months)
                    .map_err(CustomerError::from)
            })
            .await?;
        tracing::info!(customer_id = %id, service = %service, "Renewed subscription");
        Ok(customer)
    }

    async fn adjust_subscription_days(
        &self,
        id: CustomerId,
        service: &str,
        days: i64,
    ) -> Result<Customer, CustomerError> {
        if !(-MAX_ADJUST_DAYS..=MAX_ADJUST_DAYS).contains(&days) {
            return Err(CustomerError::InvalidInput(format!(
                "Adjustment must be within {MAX_ADJUST_DAYS} days"
            )));
        }
        let customer = self
            .modify_subscription(id, service, |record| {
                record.shift_days(days).map_err(CustomerError::from)
            })
            .await?;
        tracing::info!(customer_id = %id, service = %service, days, "Adjusted subscription days");
        Ok(customer)
    }

    async fn set_tolerance(
        &self,
        id: CustomerId,
        service: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Customer, CustomerError> {
        self.modify_subscription(id, service, |record| {
            record.tolerance_until = until;
            Ok(())
        })
        .await
    }

    async fn cancel_subscription(
        &self,
        id: CustomerId,
        service: &str,
    ) -> Result<Customer, CustomerError> {
        let mut customer = self.load(id).await?;
        let before = customer.subscriptions.len();
        let target = customer
            .subscription_for(service)
            .map(SubscriptionRecord::service_key)
            .ok_or_else(|| CustomerError::SubscriptionNotFound(service.to_string()))?;
        customer.subscriptions.retain(|s| s.service_key() != target);

        self.repository
            .update_subscriptions(id, &customer.subscriptions)
            .await?;
        tracing::info!(
            customer_id = %id,
            service = %service,
            removed = before - customer.subscriptions.len(),
            "Cancelled subscription"
        );
        self.trigger.trigger().await;
        Ok(customer)
    }

    async fn set_observation(
        &self,
        id: CustomerId,
        text: Option<String>,
    ) -> Result<Customer, CustomerError> {
        let mut customer = self.load(id).await?;
        customer.observation = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|text| ObservationNote {
                text,
                updated_at: Utc::now(),
            });

        self.repository
            .update_observation(id, customer.observation.as_ref())
            .await?;
        self.trigger.trigger().await;
        Ok(customer)
    }

    async fn record_charge(
        &self,
        id: CustomerId,
        entry: ChargeEntry,
    ) -> Result<Customer, CustomerError> {
        if entry.amount_minor <= 0 {
            return Err(CustomerError::InvalidInput(
                "Charge amount must be positive".to_string(),
            ));
        }

        let mut customer = self.load(id).await?;
        self.repository.append_charge(id, &entry).await?;
        tracing::info!(
            customer_id = %id,
            service = %entry.service_name,
            amount_minor = entry.amount_minor,
            "Recorded charge"
        );
        customer.charge_log.push(entry);
        self.trigger.trigger().await;
        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{InMemoryCustomerRepository, RecordingTrigger};
    use chrono::Duration;

    struct Fixture {
        repo: Arc<InMemoryCustomerRepository>,
        trigger: Arc<RecordingTrigger>,
        service: CustomerServiceImpl,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryCustomerRepository::default());
        let trigger = Arc::new(RecordingTrigger::default());
        let service = CustomerServiceImpl::new(repo.clone(), trigger.clone());
        Fixture {
            repo,
            trigger,
            service,
        }
    }

    fn seeded(fx: &Fixture) -> Customer {
        let mut customer = Customer::new("3001", "Ana");
        customer.subscriptions.push(SubscriptionRecord::new(
            "Viki Pass",
            Utc::now() - Duration::days(10),
            1,
        ));
        fx.repo.insert(customer.clone());
        customer
    }

    #[tokio::test]
    async fn test_add_subscription_rejects_duplicate_service() {
        let fx = fixture();
        let customer = seeded(&fx);

        let result = fx
            .service
            .add_subscription(customer.id, SubscriptionRecord::new("viki", Utc::now(), 1))
            .await;
        assert!(matches!(result, Err(CustomerError::DuplicateSubscription(_))));
        assert_eq!(fx.trigger.count(), 0);

        let updated = fx
            .service
            .add_subscription(customer.id, SubscriptionRecord::new("Netflix", Utc::now(), 1))
            .await
            .unwrap();
        assert_eq!(updated.subscriptions.len(), 2);
        assert_eq!(fx.repo.get(customer.id).unwrap().subscriptions.len(), 2);
        assert_eq!(fx.trigger.count(), 1);
    }

    #[tokio::test]
    async fn test_add_subscription_validates_input() {
        let fx = fixture();
        let customer = seeded(&fx);

        let mut zero = SubscriptionRecord::new("Netflix", Utc::now(), 1);
        zero.duration_months = 0;
        assert!(matches!(
            fx.service.add_subscription(customer.id, zero).await,
            Err(CustomerError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service
                .add_subscription(customer.id, SubscriptionRecord::new("  ", Utc::now(), 1))
                .await,
            Err(CustomerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_add_subscription_rejects_unstorable_names_and_terms() {
        let fx = fixture();
        let customer = seeded(&fx);

        for name in ["Viki; Pass", "Viki|Pass", "null"] {
            assert!(
                matches!(
                    fx.service
                        .add_subscription(customer.id, SubscriptionRecord::new(name, Utc::now(), 1))
                        .await,
                    Err(CustomerError::InvalidInput(_))
                ),
                "{name} should be rejected"
            );
        }

        let endless = SubscriptionRecord::new("Netflix", Utc::now(), MAX_DURATION_MONTHS + 1);
        assert!(matches!(
            fx.service.add_subscription(customer.id, endless).await,
            Err(CustomerError::InvalidInput(_))
        ));

        // Separators other than ';' and '|' are fine inside a name
        let updated = fx
            .service
            .add_subscription(customer.id, SubscriptionRecord::new("Disney+", Utc::now(), 1))
            .await
            .unwrap();
        assert!(updated.has_service("Disney+"));
        assert_eq!(fx.trigger.count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_renewal_and_adjustment_are_rejected() {
        let fx = fixture();
        let customer = seeded(&fx);

        assert!(matches!(
            fx.service
                .renew_subscription(customer.id, "Viki Pass", Some(u32::MAX))
                .await,
            Err(CustomerError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service
                .adjust_subscription_days(customer.id, "Viki Pass", 100_000_000)
                .await,
            Err(CustomerError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service
                .adjust_subscription_days(customer.id, "Viki Pass", i64::MIN)
                .await,
            Err(CustomerError::InvalidInput(_))
        ));

        assert_eq!(
            fx.repo.get(customer.id).unwrap().subscriptions,
            customer.subscriptions
        );
        assert_eq!(fx.trigger.count(), 0);
    }

    #[tokio::test]
    async fn test_early_renewal_keeps_remaining_days() {
        let fx = fixture();
        let customer = seeded(&fx);
        let old_expiry = customer.subscriptions[0].expiry();

        let updated = fx
            .service
            .renew_subscription(customer.id, "Viki Pass", None)
            .await
            .unwrap();
        let record = &updated.subscriptions[0];
        assert_eq!(record.start_date, old_expiry);
        assert_eq!(record.original_payment_date, old_expiry);
        assert!(record.paid);
        assert_eq!(fx.trigger.count(), 1);
    }

    #[tokio::test]
    async fn test_adjust_days_keeps_original_payment_date() {
        let fx = fixture();
        let customer = seeded(&fx);
        let original = customer.subscriptions[0].clone();

        let updated = fx
            .service
            .adjust_subscription_days(customer.id, "viki", 7)
            .await
            .unwrap();
        let record = &updated.subscriptions[0];
        assert_eq!(record.start_date, original.start_date + Duration::days(7));
        assert_eq!(record.original_payment_date, original.original_payment_date);
    }

    #[tokio::test]
    async fn test_cancel_subscription() {
        let fx = fixture();
        let customer = seeded(&fx);

        let updated = fx
            .service
            .cancel_subscription(customer.id, "Viki Pass")
            .await
            .unwrap();
        assert!(updated.subscriptions.is_empty());
        assert!(fx.repo.get(customer.id).unwrap().subscriptions.is_empty());

        let again = fx.service.cancel_subscription(customer.id, "Viki Pass").await;
        assert!(matches!(again, Err(CustomerError::SubscriptionNotFound(_))));
        assert_eq!(fx.trigger.count(), 1);
    }

    #[tokio::test]
    async fn test_set_tolerance_and_observation() {
        let fx = fixture();
        let customer = seeded(&fx);
        let until = Utc::now() + Duration::days(4);

        let updated = fx
            .service
            .set_tolerance(customer.id, "Viki Pass", Some(until))
            .await
            .unwrap();
        assert_eq!(updated.subscriptions[0].tolerance_until, Some(until));

        let updated = fx
            .service
            .set_observation(customer.id, Some("  pays on fridays ".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.observation.unwrap().text, "pays on fridays");

        let cleared = fx
            .service
            .set_observation(customer.id, Some("   ".to_string()))
            .await
            .unwrap();
        assert!(cleared.observation.is_none());
        assert!(fx.repo.get(customer.id).unwrap().observation.is_none());
    }

    #[tokio::test]
    async fn test_record_charge_appends() {
        let fx = fixture();
        let customer = seeded(&fx);
        let entry = ChargeEntry {
            service_name: "Viki Pass".to_string(),
            amount_minor: 1500,
            currency: "USD".to_string(),
            charged_at: Utc::now(),
            reference: None,
        };

        fx.service
            .record_charge(customer.id, entry.clone())
            .await
            .unwrap();
        let stored = fx.repo.get(customer.id).unwrap();
        assert_eq!(stored.charge_log.last_for("viki"), Some(&entry));

        let negative = ChargeEntry {
            amount_minor: 0,
            ..entry
        };
        assert!(matches!(
            fx.service.record_charge(customer.id, negative).await,
            Err(CustomerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let fx = fixture();
        let result = fx
            .service
            .renew_subscription(CustomerId::new(), "Viki", None)
            .await;
        assert!(matches!(result, Err(CustomerError::NotFound)));
    }
}
