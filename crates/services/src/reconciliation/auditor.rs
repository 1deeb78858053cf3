use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::ports::{
    signature, AssignmentSnapshot, AssociationKey, ExitEvent, ExitHistory, ExitReason,
    SnapshotEntry,
};
use crate::allocation::Allocator;
use crate::credential::{Credential, PoolPolicy, VersionKey};
use crate::customer::Customer;
use crate::subscription::{days_remaining, ExpiryPolicy};
use crate::types::{CredentialId, CustomerId};

/// Assignment computed in the current pass, before `assigned_at` is settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentAssignment {
    pub customer_id: CustomerId,
    pub service_key: String,
    pub credential_id: CredentialId,
    pub version_key: VersionKey,
    pub published_at: DateTime<Utc>,
}

pub type CurrentAssignments = BTreeMap<AssociationKey, CurrentAssignment>;

/// Every live association and its credential.
///
/// A pair is left out when the subscription is already expired and the credential
/// version was published after the expiry: that customer never had access to it.
pub fn current_assignments(
    customers: &[Customer],
    credentials: &[Credential],
    pool_policy: &PoolPolicy,
    now: DateTime<Utc>,
) -> CurrentAssignments {
    let mut allocator = Allocator::new(customers, credentials, pool_policy);
    let mut current = BTreeMap::new();

    for customer in customers.iter().filter(|c| !c.deleted) {
        for subscription in &customer.subscriptions {
            let Some(assignment) = allocator.assign(customer, &subscription.service_name) else {
                continue;
            };

            let expiry = subscription.expiry();
            if days_remaining(expiry, now) < 0 && assignment.credential.published_at > expiry {
                continue;
            }

            current.insert(
                AssociationKey::new(customer.id, &subscription.service_name),
                CurrentAssignment {
                    customer_id: customer.id,
                    service_key: subscription.service_key(),
                    credential_id: assignment.credential.id,
                    version_key: assignment.credential.version_key(),
                    published_at: assignment.credential.published_at,
                },
            );
        }
    }

    current
}

pub fn current_signature(current: &CurrentAssignments) -> String {
    signature(current.iter().map(|(k, a)| (k, &a.version_key)))
}

/// Why a previously assigned association is gone, checked in order
pub fn infer_exit_reason(
    entry: &SnapshotEntry,
    customers: &[Customer],
    expiry_policy: &ExpiryPolicy,
    now: DateTime<Utc>,
) -> ExitReason {
    let Some(customer) = customers.iter().find(|c| c.id == entry.customer_id) else {
        return ExitReason::RemovedFromStore;
    };
    if customer.deleted {
        return ExitReason::MovedToTrash;
    }
    let Some(subscription) = customer.subscription_for(&entry.service_key) else {
        return ExitReason::SubscriptionRemoved;
    };

    let status = expiry_policy.evaluate(subscription, customer.override_expiration, now);
    if status.days_remaining < 0 && entry.published_at > status.expiry {
        return ExitReason::ExpiredBeforeCredential;
    }
    ExitReason::Other
}

/// Exit events for associations present in `previous` and absent from `current`.
///
/// Re-versioned associations (same key, new version) are not exits.
pub fn exit_events(
    previous: &AssignmentSnapshot,
    current: &CurrentAssignments,
    customers: &[Customer],
    expiry_policy: &ExpiryPolicy,
    now: DateTime<Utc>,
) -> Vec<ExitEvent> {
    previous
        .iter()
        .filter(|(key, _)| !current.contains_key(*key))
        .map(|(key, entry)| ExitEvent {
            event_key: ExitEvent::event_key(key, &entry.version_key, entry.assigned_at),
            association_key: key.clone(),
            customer_id: entry.customer_id,
            credential_id: entry.credential_id,
            version_key: entry.version_key.clone(),
            reason: infer_exit_reason(entry, customers, expiry_policy, now),
            assigned_at: entry.assigned_at,
            left_at: now,
        })
        .collect()
}

/// Append new events, returning how many were not already recorded
pub fn record_exits(history: &mut ExitHistory, events: Vec<ExitEvent>) -> usize {
    let mut added = 0;
    for event in events {
        if history.insert(event) {
            added += 1;
        }
    }
    added
}

/// Snapshot for the current assignments, carrying `assigned_at` over when the version is unchanged
pub fn next_snapshot(
    previous: &AssignmentSnapshot,
    current: &CurrentAssignments,
    now: DateTime<Utc>,
) -> AssignmentSnapshot {
    let mut next = AssignmentSnapshot::default();
    for (key, assignment) in current {
        let assigned_at = previous
            .get(key)
            .filter(|entry| entry.version_key == assignment.version_key)
            .map(|entry| entry.assigned_at)
            .unwrap_or(now);

        next.insert(
            key.clone(),
            SnapshotEntry {
                customer_id: assignment.customer_id,
                service_key: assignment.service_key.clone(),
                credential_id: assignment.credential_id,
                version_key: assignment.version_key.clone(),
                published_at: assignment.published_at,
                assigned_at,
            },
        );
    }
    next
}
