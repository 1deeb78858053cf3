//! TTL caches for the full-list reads of customers and credentials.
//!
//! Only `list_*` is served from the cache. Point lookups always hit the inner
//! repository, and every write that passes through a cached repository drops the
//! cached list before returning. A list read that overlaps an invalidation is
//! returned to its caller but never cached.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use services::{
    credential::{Credential, CredentialRepository},
    customer::{AcknowledgmentMap, ChargeEntry, Customer, CustomerRepository, ObservationNote},
    subscription::SubscriptionRecord,
    CredentialId, CustomerId,
};

struct CachedList<T> {
    items: Vec<T>,
    cached_at: Instant,
}

/// A single cached list with a time-to-live
struct ListCache<T> {
    ttl: Duration,
    entry: RwLock<Option<CachedList<T>>>,
    /// Bumped by every invalidation
    generation: AtomicU64,
}

impl<T: Clone> ListCache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Taken before loading from the inner repository
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn get(&self) -> Option<Vec<T>> {
        if self.ttl.is_zero() {
            return None;
        }
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.cached_at.elapsed() < self.ttl)
            .map(|cached| cached.items.clone())
    }

    /// Cache `items` unless an invalidation happened since `loaded_at` was taken
    async fn store(&self, items: &[T], loaded_at: u64) {
        if self.ttl.is_zero() {
            return;
        }
        let mut guard = self.entry.write().await;
        if self.generation() != loaded_at {
            tracing::debug!("List changed while loading, not caching it");
            return;
        }
        *guard = Some(CachedList {
            items: items.to_vec(),
            cached_at: Instant::now(),
        });
    }

    async fn invalidate(&self) {
        let mut guard = self.entry.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }
}

pub struct CachedCustomerRepository {
    inner: Arc<dyn CustomerRepository>,
    cache: ListCache<Customer>,
}

impl CachedCustomerRepository {
    pub fn new(inner: Arc<dyn CustomerRepository>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: ListCache::new(ttl),
        }
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
        tracing::debug!("Invalidated customer list cache");
    }
}

#[async_trait]
impl CustomerRepository for CachedCustomerRepository {
    async fn list_customers(&self) -> anyhow::Result<Vec<Customer>> {
        if let Some(customers) = self.cache.get().await {
            return Ok(customers);
        }
        let loaded_at = self.cache.generation();
        let customers = self.inner.list_customers().await?;
        self.cache.store(&customers, loaded_at).await;
        Ok(customers)
    }

    async fn get_customer(&self, id: CustomerId) -> anyhow::Result<Option<Customer>> {
        self.inner.get_customer(id).await
    }

    async fn get_customer_by_phone(&self, phone: &str) -> anyhow::Result<Option<Customer>> {
        self.inner.get_customer_by_phone(phone).await
    }

    async fn upsert_customer(&self, customer: &Customer) -> anyhow::Result<()> {
        let result = self.inner.upsert_customer(customer).await;
        self.invalidate().await;
        result
    }

    async fn update_subscriptions(
        &self,
        id: CustomerId,
        subscriptions: &[SubscriptionRecord],
    ) -> anyhow::Result<()> {
        let result = self.inner.update_subscriptions(id, subscriptions).await;
        self.invalidate().await;
        result
    }

    async fn set_deleted(&self, id: CustomerId, deleted: bool) -> anyhow::Result<()> {
        let result = self.inner.set_deleted(id, deleted).await;
        self.invalidate().await;
        result
    }

    async fn update_acknowledgments(
        &self,
        id: CustomerId,
        acknowledgments: &AcknowledgmentMap,
    ) -> anyhow::Result<()> {
        let result = self.inner.update_acknowledgments(id, acknowledgments).await;
        self.invalidate().await;
        result
    }

    async fn update_observation(
        &self,
        id: CustomerId,
        observation: Option<&ObservationNote>,
    ) -> anyhow::Result<()> {
        let result = self.inner.update_observation(id, observation).await;
        self.invalidate().await;
        result
    }

    async fn append_charge(&self, id: CustomerId, entry: &ChargeEntry) -> anyhow::Result<()> {
        let result = self.inner.append_charge(id, entry).await;
        self.invalidate().await;
        result
    }
}

pub struct CachedCredentialRepository {
    inner: Arc<dyn CredentialRepository>,
    cache: ListCache<Credential>,
}

impl CachedCredentialRepository {
    pub fn new(inner: Arc<dyn CredentialRepository>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: ListCache::new(ttl),
        }
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
        tracing::debug!("Invalidated credential list cache");
    }
}

#[async_trait]
impl CredentialRepository for CachedCredentialRepository {
    async fn list_credentials(&self) -> anyhow::Result<Vec<Credential>> {
        if let Some(credentials) = self.cache.get().await {
            return Ok(credentials);
        }
        let loaded_at = self.cache.generation();
        let credentials = self.inner.list_credentials().await?;
        self.cache.store(&credentials, loaded_at).await;
        Ok(credentials)
    }

    async fn get_credential(&self, id: CredentialId) -> anyhow::Result<Option<Credential>> {
        self.inner.get_credential(id).await
    }

    async fn upsert_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        let result = self.inner.upsert_credential(credential).await;
        self.invalidate().await;
        result
    }

    async fn delete_credential(&self, id: CredentialId) -> anyhow::Result<()> {
        let result = self.inner.delete_credential(id).await;
        self.invalidate().await;
        result
    }
}
