use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pool::CredentialHealth;
use crate::types::CredentialId;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<anyhow::Error> for CredentialError {
    fn from(err: anyhow::Error) -> Self {
        Self::Repository(err.to_string())
    }
}

/// A shared login for a third-party service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub service: String,
    pub secret_email: String,
    pub secret_password: String,
    /// Changes on every secret edit; each value is a new version
    pub published_at: DateTime<Utc>,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Never print the shared password
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("secret_email", &self.secret_email)
            .field("secret_password", &"[REDACTED]")
            .field("published_at", &self.published_at)
            .field("visible", &self.visible)
            .finish()
    }
}

/// Publish instants keep the store's microsecond precision
pub fn publish_instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

impl Credential {
    pub fn version_key(&self) -> VersionKey {
        VersionKey::new(self.id, self.published_at)
    }

    /// Publish instant for the next version, strictly after the current one
    pub fn next_published_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = publish_instant(now);
        let current = publish_instant(self.published_at);
        if candidate > current {
            candidate
        } else {
            current + Duration::microseconds(1)
        }
    }
}

/// Content epoch of a credential: row id plus publish timestamp
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionKey(String);

impl VersionKey {
    pub fn new(id: CredentialId, published_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}@{}",
            id,
            publish_instant(published_at).to_rfc3339_opts(SecondsFormat::Micros, true)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn credential_id(&self) -> Option<CredentialId> {
        self.0.split('@').next().and_then(|id| id.parse().ok())
    }
}

impl From<String> for VersionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for publishing a new credential
#[derive(Clone)]
pub struct NewCredential {
    pub service: String,
    pub secret_email: String,
    pub secret_password: String,
    pub visible: bool,
}

/// Pool slot with its health at a point in time
#[derive(Debug, Clone)]
pub struct CredentialHealthReport {
    pub credential: Credential,
    pub pool_index: usize,
    pub assignees: usize,
    pub health: CredentialHealth,
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn list_credentials(&self) -> anyhow::Result<Vec<Credential>>;

    async fn get_credential(&self, id: CredentialId) -> anyhow::Result<Option<Credential>>;

    async fn upsert_credential(&self, credential: &Credential) -> anyhow::Result<()>;

    /// Physically removes the row; active assignments disappear with it
    async fn delete_credential(&self, id: CredentialId) -> anyhow::Result<()>;
}

/// Operator-facing credential management. Mutations trigger reconciliation.
#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn publish_credential(&self, new: NewCredential) -> Result<Credential, CredentialError>;

    /// Replace the secret pair; mints a new version
    async fn rotate_secret(
        &self,
        id: CredentialId,
        secret_email: Option<String>,
        secret_password: String,
    ) -> Result<Credential, CredentialError>;

    async fn set_visibility(
        &self,
        id: CredentialId,
        visible: bool,
    ) -> Result<Credential, CredentialError>;

    async fn delete_credential(&self, id: CredentialId) -> Result<(), CredentialError>;

    /// Ordered pool for `service` with assignee counts and health
    async fn pool_health(
        &self,
        service: &str,
    ) -> Result<Vec<CredentialHealthReport>, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_version_key_changes_with_publish_time() {
        let id = CredentialId::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let v0 = VersionKey::new(id, t0);
        assert_eq!(v0, VersionKey::new(id, t0));
        assert_ne!(v0, VersionKey::new(id, t1));
        assert_eq!(v0.credential_id(), Some(id));
        assert!(v0.as_str().ends_with("2024-01-01T00:00:00.000000Z"));
    }

    #[test]
    fn test_version_key_distinguishes_microseconds() {
        let id = CredentialId::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_ne!(
            VersionKey::new(id, t0 + Duration::microseconds(1)),
            VersionKey::new(id, t0 + Duration::microseconds(2))
        );
        // Below the store's precision there is no new version
        assert_eq!(
            VersionKey::new(id, t0 + Duration::nanoseconds(100)),
            VersionKey::new(id, t0)
        );
    }

    #[test]
    fn test_next_published_at_is_strictly_later() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut credential = Credential {
            id: CredentialId::new(),
            service: "Viki Pass".to_string(),
            secret_email: "shared@example.com".to_string(),
            secret_password: "hunter2".to_string(),
            published_at: t0,
            visible: true,
            created_at: t0,
            updated_at: t0,
        };

        // Same instant and a clock that went backwards both move forward
        assert_eq!(credential.next_published_at(t0), t0 + Duration::microseconds(1));
        assert_eq!(
            credential.next_published_at(t0 - Duration::days(1)),
            t0 + Duration::microseconds(1)
        );

        let later = t0 + Duration::nanoseconds(1_500_700);
        assert_eq!(credential.next_published_at(later), t0 + Duration::microseconds(1500));

        credential.published_at = credential.next_published_at(t0);
        assert_ne!(
            credential.version_key(),
            VersionKey::new(credential.id, t0)
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let now = Utc::now();
        let credential = Credential {
            id: CredentialId::new(),
            service: "Viki Pass".to_string(),
            secret_email: "shared@example.com".to_string(),
            secret_password: "hunter2".to_string(),
            published_at: now,
            visible: true,
            created_at: now,
            updated_at: now,
        };
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));
    }
}
