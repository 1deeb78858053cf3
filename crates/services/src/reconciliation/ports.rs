use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::credential::VersionKey;
use crate::subscription::service_key;
use crate::types::{CredentialId, CustomerId};

#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    /// Store read or write failed; the pass is abandoned and the next one retries
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<anyhow::Error> for ReconciliationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// `(customer, normalized service)` pair
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationKey(String);

impl AssociationKey {
    pub fn new(customer_id: CustomerId, service: &str) -> Self {
        Self(format!("{}:{}", customer_id, service_key(service)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted state of one association
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub customer_id: CustomerId,
    pub service_key: String,
    pub credential_id: CredentialId,
    pub version_key: VersionKey,
    pub published_at: DateTime<Utc>,
    /// Kept while the version is unchanged, restamped when it changes
    pub assigned_at: DateTime<Utc>,
}

/// Map of every association that had a credential at the end of the last pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentSnapshot(BTreeMap<AssociationKey, SnapshotEntry>);

impl AssignmentSnapshot {
    pub fn get(&self, key: &AssociationKey) -> Option<&SnapshotEntry> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &AssociationKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: AssociationKey, entry: SnapshotEntry) {
        self.0.insert(key, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssociationKey, &SnapshotEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `key=version` pairs in key order, joined by `|`
    pub fn signature(&self) -> String {
        signature(self.0.iter().map(|(k, e)| (k, &e.version_key)))
    }
}

pub(crate) fn signature<'a>(
    entries: impl Iterator<Item = (&'a AssociationKey, &'a VersionKey)>,
) -> String {
    entries
        .map(|(key, version)| format!("{}={}", key, version))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    RemovedFromStore,
    MovedToTrash,
    SubscriptionRemoved,
    ExpiredBeforeCredential,
    Other,
}

impl ExitReason {
    pub fn description(&self) -> &'static str {
        match self {
            ExitReason::RemovedFromStore => "removed from store",
            ExitReason::MovedToTrash => "moved to trash",
            ExitReason::SubscriptionRemoved => "subscription removed or changed",
            ExitReason::ExpiredBeforeCredential => {
                "subscription expired before this credential existed"
            }
            ExitReason::Other => "access lost for another reason",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Audit record of an association disappearing
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    /// `association|version|assigned_at`, unique across the history
    pub event_key: String,
    pub association_key: AssociationKey,
    pub customer_id: CustomerId,
    pub credential_id: CredentialId,
    pub version_key: VersionKey,
    pub reason: ExitReason,
    pub assigned_at: DateTime<Utc>,
    pub left_at: DateTime<Utc>,
}

impl ExitEvent {
    pub fn event_key(
        association_key: &AssociationKey,
        version_key: &VersionKey,
        assigned_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}|{}|{}",
            association_key,
            version_key,
            assigned_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Append-only exit events, bucketed by version key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitHistory(BTreeMap<VersionKey, Vec<ExitEvent>>);

impl ExitHistory {
    pub fn contains(&self, event: &ExitEvent) -> bool {
        self.0
            .get(&event.version_key)
            .map(|events| events.iter().any(|e| e.event_key == event.event_key))
            .unwrap_or(false)
    }

    /// Append unless an event with the same key exists; returns whether it was added
    pub fn insert(&mut self, event: ExitEvent) -> bool {
        if self.contains(&event) {
            return false;
        }
        self.0
            .entry(event.version_key.clone())
            .or_default()
            .push(event);
        true
    }

    pub fn for_version(&self, version_key: &VersionKey) -> Vec<ExitEvent> {
        self.0.get(version_key).cloned().unwrap_or_default()
    }

    /// Events of every version of a credential, oldest version first
    pub fn for_credential(&self, credential_id: CredentialId) -> Vec<ExitEvent> {
        self.0
            .values()
            .flatten()
            .filter(|e| e.credential_id == credential_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one reconciliation pass
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Signatures matched the last processed pair; nothing was compared or written
    pub short_circuited: bool,
    pub associations: usize,
    pub exits_emitted: usize,
    pub snapshot_written: bool,
    pub history_written: bool,
}

/// Persistence of the two audit blobs
#[async_trait]
pub trait AuditStateRepository: Send + Sync {
    async fn load_snapshot(&self) -> anyhow::Result<AssignmentSnapshot>;

    async fn save_snapshot(&self, snapshot: &AssignmentSnapshot) -> anyhow::Result<()>;

    async fn load_exit_history(&self) -> anyhow::Result<ExitHistory>;

    async fn save_exit_history(&self, history: &ExitHistory) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReconciliationService: Send + Sync {
    /// Diff current assignments against the persisted snapshot and record exits
    async fn run_pass(&self) -> Result<ReconciliationReport, ReconciliationError>;

    async fn exit_events_for_version(
        &self,
        version_key: &VersionKey,
    ) -> Result<Vec<ExitEvent>, ReconciliationError>;

    async fn exit_events_for_credential(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<ExitEvent>, ReconciliationError>;
}

/// Entry point called after every customer or credential mutation
#[async_trait]
pub trait ReconciliationTrigger: Send + Sync {
    async fn trigger(&self);
}
