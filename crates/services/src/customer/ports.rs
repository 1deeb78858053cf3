use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::subscription::codec::DateOutOfRange;
use crate::subscription::{service_key, service_matches, SubscriptionRecord};
use crate::types::CustomerId;

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("Customer not found")]
    NotFound,
    #[error("No subscription matching service '{0}'")]
    SubscriptionNotFound(String),
    #[error("Customer already has a subscription for '{0}'")]
    DuplicateSubscription(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<anyhow::Error> for CustomerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Repository(err.to_string())
    }
}

impl From<DateOutOfRange> for CustomerError {
    fn from(err: DateOutOfRange) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// A customer sharing credentials through one or more subscriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub phone: String,
    pub name: String,
    /// At most one record per service key
    pub subscriptions: Vec<SubscriptionRecord>,
    /// Duration applied to entries stored without one
    pub default_duration_months: Option<u32>,
    /// Account-level flag that suppresses blocking
    pub override_expiration: bool,
    /// Soft delete ("trash"); rows are never hard-deleted by the engine
    pub deleted: bool,
    pub acknowledgments: AcknowledgmentMap,
    pub observation: Option<ObservationNote>,
    pub charge_log: ChargeLog,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(phone: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::new(),
            phone: phone.into(),
            name: name.into(),
            subscriptions: Vec::new(),
            default_duration_months: None,
            override_expiration: false,
            deleted: false,
            acknowledgments: AcknowledgmentMap::default(),
            observation: None,
            charge_log: ChargeLog::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sort key: the phone's digits, or the trimmed phone if it has none
    pub fn phone_key(&self) -> String {
        phone_key(&self.phone)
    }

    /// First subscription whose service fuzzily matches `service`
    pub fn subscription_for(&self, service: &str) -> Option<&SubscriptionRecord> {
        self.subscriptions
            .iter()
            .find(|s| service_matches(&s.service_name, service))
    }

    pub fn subscription_for_mut(&mut self, service: &str) -> Option<&mut SubscriptionRecord> {
        self.subscriptions
            .iter_mut()
            .find(|s| service_matches(&s.service_name, service))
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.subscription_for(service).is_some()
    }
}

pub fn phone_key(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        phone.trim().to_string()
    } else {
        digits
    }
}

/// Last acknowledged credential version (`published_at`) per service key
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcknowledgmentMap(BTreeMap<String, DateTime<Utc>>);

impl AcknowledgmentMap {
    pub fn last_acknowledged(&self, service: &str) -> Option<DateTime<Utc>> {
        self.0.get(&service_key(service)).copied()
    }

    /// A notice is due when the assigned version is newer than the last acknowledged one
    pub fn is_notice_due(&self, service: &str, published_at: DateTime<Utc>) -> bool {
        match self.last_acknowledged(service) {
            Some(acked) => published_at > acked,
            None => true,
        }
    }

    /// Record an acknowledgment. Never moves an entry backwards; returns whether it changed.
    pub fn acknowledge(&mut self, service: &str, published_at: DateTime<Utc>) -> bool {
        let key = service_key(service);
        match self.0.get(&key) {
            Some(existing) if *existing >= published_at => false,
            _ => {
                self.0.insert(key, published_at);
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DateTime<Utc>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Free-form operator note attached to a customer
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationNote {
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeEntry {
    pub service_name: String,
    /// Amount in minor units (cents)
    pub amount_minor: i64,
    pub currency: String,
    pub charged_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Append-only history of charges recorded against a customer
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeLog(Vec<ChargeEntry>);

impl ChargeLog {
    pub fn push(&mut self, entry: ChargeEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[ChargeEntry] {
        &self.0
    }

    pub fn last_for(&self, service: &str) -> Option<&ChargeEntry> {
        self.0
            .iter()
            .rev()
            .find(|e| service_matches(&e.service_name, service))
    }
}

/// Store access for customers. Rows are soft-deleted only.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// All customers, trashed ones included
    async fn list_customers(&self) -> anyhow::Result<Vec<Customer>>;

    async fn get_customer(&self, id: CustomerId) -> anyhow::Result<Option<Customer>>;

    async fn get_customer_by_phone(&self, phone: &str) -> anyhow::Result<Option<Customer>>;

    /// Insert or replace a full customer row (onboarding, imports)
    async fn upsert_customer(&self, customer: &Customer) -> anyhow::Result<()>;

    async fn update_subscriptions(
        &self,
        id: CustomerId,
        subscriptions: &[SubscriptionRecord],
    ) -> anyhow::Result<()>;

    async fn set_deleted(&self, id: CustomerId, deleted: bool) -> anyhow::Result<()>;

    /// Replace the acknowledgment map in a single write
    async fn update_acknowledgments(
        &self,
        id: CustomerId,
        acknowledgments: &AcknowledgmentMap,
    ) -> anyhow::Result<()>;

    async fn update_observation(
        &self,
        id: CustomerId,
        observation: Option<&ObservationNote>,
    ) -> anyhow::Result<()>;

    async fn append_charge(&self, id: CustomerId, entry: &ChargeEntry) -> anyhow::Result<()>;
}

/// Operator-facing customer mutations. Each successful mutation triggers reconciliation.
#[async_trait]
pub trait CustomerService: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> Result<Customer, CustomerError>;

    async fn add_subscription(
        &self,
        id: CustomerId,
        record: SubscriptionRecord,
    ) -> Result<Customer, CustomerError>;

    async fn renew_subscription(
        &self,
        id: CustomerId,
        service: &str,
        duration_months: Option<u32>,
    ) -> Result<Customer, CustomerError>;

    /// Shift the start date by `days`, keeping the original payment date
    async fn adjust_subscription_days(
        &self,
        id: CustomerId,
        service: &str,
        days: i64,
    ) -> Result<Customer, CustomerError>;

    async fn set_tolerance(
        &self,
        id: CustomerId,
        service: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Customer, CustomerError>;

    async fn cancel_subscription(
        &self,
        id: CustomerId,
        service: &str,
    ) -> Result<Customer, CustomerError>;

    async fn set_observation(
        &self,
        id: CustomerId,
        text: Option<String>,
    ) -> Result<Customer, CustomerError>;

    async fn record_charge(
        &self,
        id: CustomerId,
        entry: ChargeEntry,
    ) -> Result<Customer, CustomerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_phone_key_keeps_digits() {
        assert_eq!(phone_key("+57 (300) 123-4567"), "573001234567");
        assert_eq!(phone_key(" unknown "), "unknown");
    }

    #[test]
    fn test_subscription_lookup_is_fuzzy() {
        let mut customer = Customer::new("3001234567", "Ana");
        customer
            .subscriptions
            .push(SubscriptionRecord::new("Viki Pass", Utc::now(), 1));
        assert!(customer.has_service("viki"));
        assert!(customer.has_service("VIKI PASS PLUS"));
        assert!(!customer.has_service("Netflix"));
    }

    #[test]
    fn test_acknowledgment_never_regresses() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut acks = AcknowledgmentMap::default();
        assert!(acks.is_notice_due("Viki", t0));

        acks.acknowledge("Viki Pass", t0 + Duration::days(2));
        acks.acknowledge("viki pass", t0);
        assert_eq!(acks.last_acknowledged("VIKI PASS"), Some(t0 + Duration::days(2)));
        assert!(!acks.is_notice_due("Viki Pass", t0 + Duration::days(1)));
        assert!(acks.is_notice_due("Viki Pass", t0 + Duration::days(3)));
    }

    #[test]
    fn test_charge_log_last_for_service() {
        let now = Utc::now();
        let mut log = ChargeLog::default();
        for (service, amount) in [("Viki", 100), ("Netflix", 200), ("Viki Pass", 300)] {
            log.push(ChargeEntry {
                service_name: service.to_string(),
                amount_minor: amount,
                currency: "USD".to_string(),
                charged_at: now,
                reference: None,
            });
        }
        assert_eq!(log.last_for("viki").map(|e| e.amount_minor), Some(300));
        assert_eq!(log.entries().len(), 3);
    }
}
