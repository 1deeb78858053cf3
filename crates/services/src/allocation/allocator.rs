//! Deterministic credential allocation.
//!
//! Primary path is a rank-based round robin: the customers of a service are ranked
//! by phone key and rank `r` gets pool slot `r mod len(pool)`. A customer missing
//! from the ranking (stale list, trashed row) falls back to a phone hash. The two
//! paths can disagree for the same customer; every fallback and every observed
//! disagreement is logged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::credential::{Credential, CredentialPool, PoolPolicy};
use crate::customer::Customer;
use crate::subscription::service_key;
use crate::types::CustomerId;

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Rank,
    HashFallback,
}

/// Credential chosen for a (customer, service) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub credential: Credential,
    pub pool_index: usize,
    pub pool_size: usize,
    pub strategy: AssignmentStrategy,
    /// Position in the ranked client list when the rank path was used
    pub rank: Option<usize>,
}

/// Rank path and hash path picked different slots for the same input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyWarning {
    pub customer_id: CustomerId,
    pub service: String,
    pub rank_index: usize,
    pub hash_index: usize,
}

/// Non-deleted customers holding a subscription for `service`, by phone key then id
pub fn active_clients<'a>(customers: &'a [Customer], service: &str) -> Vec<&'a Customer> {
    let mut active: Vec<&Customer> = customers
        .iter()
        .filter(|c| !c.deleted && c.has_service(service))
        .collect();
    active.sort_by(|a, b| {
        a.phone_key()
            .cmp(&b.phone_key())
            .then_with(|| a.id.cmp(&b.id))
    });
    active
}

/// Sum of the character codes of the phone string
pub fn phone_hash(phone: &str) -> u64 {
    phone.chars().map(|c| u64::from(u32::from(c))).sum()
}

pub fn hash_slot(phone: &str, pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }
    Some((phone_hash(phone) % pool_len as u64) as usize)
}

#[derive(Debug)]
struct ServiceSlots {
    pool: CredentialPool,
    ranked: Vec<CustomerId>,
}

/// Allocation over one consistent view of customers and credentials.
///
/// Pools and rankings are computed once per requested service and memoized, so a
/// full pass stays linear in the number of associations.
pub struct Allocator<'a> {
    customers: &'a [Customer],
    credentials: &'a [Credential],
    policy: &'a PoolPolicy,
    slots: HashMap<String, ServiceSlots>,
}

impl<'a> Allocator<'a> {
    pub fn new(
        customers: &'a [Customer],
        credentials: &'a [Credential],
        policy: &'a PoolPolicy,
    ) -> Self {
        Self {
            customers,
            credentials,
            policy,
            slots: HashMap::new(),
        }
    }

    fn slots_for(&mut self, service: &str) -> &ServiceSlots {
        let customers = self.customers;
        let credentials = self.credentials;
        let policy = self.policy;
        self.slots.entry(service_key(service)).or_insert_with(|| ServiceSlots {
            pool: CredentialPool::for_service(credentials, service, policy),
            ranked: active_clients(customers, service)
                .into_iter()
                .map(|c| c.id)
                .collect(),
        })
    }

    pub fn pool(&mut self, service: &str) -> &CredentialPool {
        &self.slots_for(service).pool
    }

    /// Ranked customer ids for `service`
    pub fn ranking(&mut self, service: &str) -> &[CustomerId] {
        &self.slots_for(service).ranked
    }

    /// Credential for `(customer, service)`, or `None` when the pool is empty.
    pub fn assign(&mut self, customer: &Customer, service: &str) -> Option<Assignment> {
        let slots = self.slots_for(service);
        let pool_len = slots.pool.len();
        if pool_len == 0 {
            return None;
        }

        if let Some(rank) = slots.ranked.iter().position(|id| *id == customer.id) {
            let index = rank % pool_len;
            return slots.pool.get(index).map(|credential| Assignment {
                credential: credential.clone(),
                pool_index: index,
                pool_size: pool_len,
                strategy: AssignmentStrategy::Rank,
                rank: Some(rank),
            });
        }

        let index = hash_slot(&customer.phone, pool_len)?;
        tracing::warn!(
            customer_id = %customer.id,
            service = %service,
            pool_index = index,
            "Customer not in ranked client list, using phone hash fallback"
        );
        slots.pool.get(index).map(|credential| Assignment {
            credential: credential.clone(),
            pool_index: index,
            pool_size: pool_len,
            strategy: AssignmentStrategy::HashFallback,
            rank: None,
        })
    }

    /// Run both paths for the same input and report a disagreement.
    ///
    /// Returns `None` when they agree, when the pool is empty or when the customer
    /// is not ranked (only the hash path is reachable then).
    pub fn check_consistency(
        &mut self,
        customer: &Customer,
        service: &str,
    ) -> Option<ConsistencyWarning> {
        let slots = self.slots_for(service);
        let pool_len = slots.pool.len();
        let rank = slots.ranked.iter().position(|id| *id == customer.id)?;
        let rank_index = rank % pool_len.max(1);
        let hash_index = hash_slot(&customer.phone, pool_len)?;

        (rank_index != hash_index).then(|| ConsistencyWarning {
            customer_id: customer.id,
            service: service.to_string(),
            rank_index,
            hash_index,
        })
    }
}
