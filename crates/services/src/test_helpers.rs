//! In-memory repository fakes shared by unit tests and the API integration tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::credential::{Credential, CredentialRepository};
use crate::customer::{
    phone_key, AcknowledgmentMap, ChargeEntry, Customer, CustomerRepository, ObservationNote,
};
use crate::reconciliation::{AssignmentSnapshot, AuditStateRepository, ExitHistory, ReconciliationTrigger};
use crate::subscription::SubscriptionRecord;
use crate::types::{CredentialId, CustomerId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write switch and counter shared by the fakes
#[derive(Default)]
struct WriteGate {
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl WriteGate {
    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("simulated store failure");
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: Mutex<HashMap<CustomerId, Customer>>,
    hidden: Mutex<HashSet<CustomerId>>,
    gate: WriteGate,
}

impl InMemoryCustomerRepository {
    /// Seed or replace a row directly; not counted as a write
    pub fn insert(&self, customer: Customer) {
        lock(&self.customers).insert(customer.id, customer);
    }

    pub fn get(&self, id: CustomerId) -> Option<Customer> {
        lock(&self.customers).get(&id).cloned()
    }

    /// Hard-remove a row, as an external process would
    pub fn remove(&self, id: CustomerId) {
        lock(&self.customers).remove(&id);
    }

    /// Keep the row reachable by id but leave it out of `list_customers`, like a stale list cache
    pub fn hide_from_list(&self, id: CustomerId) {
        lock(&self.hidden).insert(id);
    }

    pub fn write_count(&self) -> usize {
        self.gate.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, failing: bool) {
        self.gate.failing.store(failing, Ordering::SeqCst);
    }

    fn update<F>(&self, id: CustomerId, change: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Customer),
    {
        self.gate.check()?;
        let mut customers = lock(&self.customers);
        let customer = customers
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("customer {} not found", id))?;
        change(customer);
        customer.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn list_customers(&self) -> anyhow::Result<Vec<Customer>> {
        let hidden = lock(&self.hidden).clone();
        let mut customers: Vec<Customer> = lock(&self.customers)
            .values()
            .filter(|c| !hidden.contains(&c.id))
            .cloned()
            .collect();
        customers.sort_by_key(|c| c.id);
        Ok(customers)
    }

    async fn get_customer(&self, id: CustomerId) -> anyhow::Result<Option<Customer>> {
        Ok(self.get(id))
    }

    async fn get_customer_by_phone(&self, phone: &str) -> anyhow::Result<Option<Customer>> {
        let key = phone_key(phone);
        Ok(lock(&self.customers)
            .values()
            .find(|c| c.phone_key() == key)
            .cloned())
    }

    async fn upsert_customer(&self, customer: &Customer) -> anyhow::Result<()> {
        self.gate.check()?;
        self.insert(customer.clone());
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        id: CustomerId,
        subscriptions: &[SubscriptionRecord],
    ) -> anyhow::Result<()> {
        self.update(id, |c| c.subscriptions = subscriptions.to_vec())
    }

    async fn set_deleted(&self, id: CustomerId, deleted: bool) -> anyhow::Result<()> {
        self.update(id, |c| c.deleted = deleted)
    }

    async fn update_acknowledgments(
        &self,
        id: CustomerId,
        acknowledgments: &AcknowledgmentMap,
    ) -> anyhow::Result<()> {
        self.update(id, |c| c.acknowledgments = acknowledgments.clone())
    }

    async fn update_observation(
        &self,
        id: CustomerId,
        observation: Option<&ObservationNote>,
    ) -> anyhow::Result<()> {
        self.update(id, |c| c.observation = observation.cloned())
    }

    async fn append_charge(&self, id: CustomerId, entry: &ChargeEntry) -> anyhow::Result<()> {
        self.update(id, |c| c.charge_log.push(entry.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credentials: Mutex<HashMap<CredentialId, Credential>>,
    gate: WriteGate,
}

impl InMemoryCredentialRepository {
    pub fn insert(&self, credential: Credential) {
        lock(&self.credentials).insert(credential.id, credential);
    }

    pub fn remove(&self, id: CredentialId) {
        lock(&self.credentials).remove(&id);
    }

    /// Every stored credential, oldest publish first
    pub fn all(&self) -> Vec<Credential> {
        let mut all: Vec<Credential> = lock(&self.credentials).values().cloned().collect();
        all.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn write_count(&self) -> usize {
        self.gate.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, failing: bool) {
        self.gate.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn list_credentials(&self) -> anyhow::Result<Vec<Credential>> {
        Ok(self.all())
    }

    async fn get_credential(&self, id: CredentialId) -> anyhow::Result<Option<Credential>> {
        Ok(lock(&self.credentials).get(&id).cloned())
    }

    async fn upsert_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        self.gate.check()?;
        self.insert(credential.clone());
        Ok(())
    }

    async fn delete_credential(&self, id: CredentialId) -> anyhow::Result<()> {
        self.gate.check()?;
        self.remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditStateRepository {
    snapshot: Mutex<AssignmentSnapshot>,
    history: Mutex<ExitHistory>,
    gate: WriteGate,
}

impl InMemoryAuditStateRepository {
    pub fn snapshot(&self) -> AssignmentSnapshot {
        lock(&self.snapshot).clone()
    }

    pub fn history(&self) -> ExitHistory {
        lock(&self.history).clone()
    }

    pub fn write_count(&self) -> usize {
        self.gate.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, failing: bool) {
        self.gate.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditStateRepository for InMemoryAuditStateRepository {
    async fn load_snapshot(&self) -> anyhow::Result<AssignmentSnapshot> {
        Ok(self.snapshot())
    }

    async fn save_snapshot(&self, snapshot: &AssignmentSnapshot) -> anyhow::Result<()> {
        self.gate.check()?;
        *lock(&self.snapshot) = snapshot.clone();
        Ok(())
    }

    async fn load_exit_history(&self) -> anyhow::Result<ExitHistory> {
        Ok(self.history())
    }

    async fn save_exit_history(&self, history: &ExitHistory) -> anyhow::Result<()> {
        self.gate.check()?;
        *lock(&self.history) = history.clone();
        Ok(())
    }
}

/// Counts triggers without reconciling
#[derive(Default)]
pub struct RecordingTrigger {
    count: AtomicUsize,
}

impl RecordingTrigger {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReconciliationTrigger for RecordingTrigger {
    async fn trigger(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
