use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::Credential;
use crate::subscription::service_matches;
use crate::types::CredentialId;

/// Maximum assignees per credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Limited(usize),
    Unlimited,
}

impl Capacity {
    /// Parses `"unlimited"` or a positive integer
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("unlimited") {
            return Some(Capacity::Unlimited);
        }
        value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Capacity::Limited)
    }

    pub fn is_reached(&self, assignees: usize) -> bool {
        match self {
            Capacity::Limited(limit) => assignees >= *limit,
            Capacity::Unlimited => false,
        }
    }
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialHealth {
    Healthy,
    Overcrowded,
    Expired,
}

/// Pool filtering and health rules
#[derive(Debug, Clone)]
pub struct PoolPolicy {
    /// Credentials whose secret email contains this marker never join a pool
    pub demo_email_marker: String,
    /// Provider name to maximum credential age in days, matched fuzzily
    pub expiry_thresholds: Vec<(String, i64)>,
    pub default_expiry_days: i64,
    /// Service name to capacity, matched fuzzily
    pub capacity_limits: Vec<(String, Capacity)>,
    pub default_capacity: Capacity,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            demo_email_marker: "demo".to_string(),
            expiry_thresholds: vec![
                ("viki".to_string(), 30),
                ("netflix".to_string(), 25),
                ("disney".to_string(), 14),
            ],
            default_expiry_days: 30,
            capacity_limits: Vec::new(),
            default_capacity: Capacity::Limited(5),
        }
    }
}

impl PoolPolicy {
    pub fn expiry_threshold_days(&self, service: &str) -> i64 {
        self.expiry_thresholds
            .iter()
            .find(|(provider, _)| service_matches(provider, service))
            .map(|(_, days)| *days)
            .unwrap_or(self.default_expiry_days)
    }

    pub fn capacity_for(&self, service: &str) -> Capacity {
        self.capacity_limits
            .iter()
            .find(|(name, _)| service_matches(name, service))
            .map(|(_, capacity)| *capacity)
            .unwrap_or(self.default_capacity)
    }

    fn is_demo(&self, credential: &Credential) -> bool {
        let marker = self.demo_email_marker.trim().to_lowercase();
        !marker.is_empty() && credential.secret_email.to_lowercase().contains(&marker)
    }

    /// Health of one credential given its current number of assignees
    pub fn classify(
        &self,
        credential: &Credential,
        assignees: usize,
        now: DateTime<Utc>,
    ) -> CredentialHealth {
        let age_days = (now - credential.published_at).num_days();
        if age_days > self.expiry_threshold_days(&credential.service) {
            return CredentialHealth::Expired;
        }
        if self.capacity_for(&credential.service).is_reached(assignees) {
            return CredentialHealth::Overcrowded;
        }
        CredentialHealth::Healthy
    }
}

/// Ordered pool of shared credentials for one service.
///
/// Order is ascending `published_at` (id breaks ties); a credential's position is
/// its slot number for allocation.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    service: String,
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn for_service(all: &[Credential], service: &str, policy: &PoolPolicy) -> Self {
        let mut credentials: Vec<Credential> = all
            .iter()
            .filter(|c| c.visible)
            .filter(|c| !policy.is_demo(c))
            .filter(|c| service_matches(&c.service, service))
            .cloned()
            .collect();
        credentials.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Self {
            service: service.to_string(),
            credentials,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    pub fn index_of(&self, id: CredentialId) -> Option<usize> {
        self.credentials.iter().position(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn credential(service: &str, email: &str, published_at: DateTime<Utc>) -> Credential {
        Credential {
            id: CredentialId::new(),
            service: service.to_string(),
            secret_email: email.to_string(),
            secret_password: "pw".to_string(),
            published_at,
            visible: true,
            created_at: published_at,
            updated_at: published_at,
        }
    }

    #[test]
    fn test_pool_filters_and_orders_by_publish_time() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = credential("Viki Pass", "b@example.com", t0 + Duration::days(3));
        let early = credential("viki", "a@example.com", t0);
        let demo = credential("Viki Pass", "DEMO-account@example.com", t0);
        let other = credential("Netflix", "n@example.com", t0);
        let mut hidden = credential("Viki Pass", "h@example.com", t0);
        hidden.visible = false;

        let all = vec![late.clone(), demo, other, hidden, early.clone()];
        let pool = CredentialPool::for_service(&all, "Viki Pass", &PoolPolicy::default());

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0).map(|c| c.id), Some(early.id));
        assert_eq!(pool.get(1).map(|c| c.id), Some(late.id));
        assert_eq!(pool.index_of(late.id), Some(1));
    }

    #[test]
    fn test_empty_pool() {
        let pool = CredentialPool::for_service(&[], "Viki", &PoolPolicy::default());
        assert!(pool.is_empty());
        assert!(pool.get(0).is_none());
    }

    #[test]
    fn test_health_classification() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let policy = PoolPolicy {
            capacity_limits: vec![
                ("Netflix".to_string(), Capacity::Limited(2)),
                ("Viki".to_string(), Capacity::Unlimited),
            ],
            ..PoolPolicy::default()
        };

        let stale = credential("Disney Plus", "d@example.com", now - Duration::days(15));
        assert_eq!(policy.classify(&stale, 0, now), CredentialHealth::Expired);

        let fresh = credential("Disney Plus", "d@example.com", now - Duration::days(14));
        assert_eq!(policy.classify(&fresh, 0, now), CredentialHealth::Healthy);

        let crowded = credential("Netflix", "n@example.com", now - Duration::days(1));
        assert_eq!(policy.classify(&crowded, 2, now), CredentialHealth::Overcrowded);
        assert_eq!(policy.classify(&crowded, 1, now), CredentialHealth::Healthy);

        let unlimited = credential("Viki Pass", "v@example.com", now - Duration::days(1));
        assert_eq!(policy.classify(&unlimited, 500, now), CredentialHealth::Healthy);
    }

    #[test]
    fn test_capacity_parse() {
        assert_eq!(Capacity::parse("unlimited"), Some(Capacity::Unlimited));
        assert_eq!(Capacity::parse(" 4 "), Some(Capacity::Limited(4)));
        assert_eq!(Capacity::parse("0"), None);
        assert_eq!(Capacity::parse("many"), None);
    }
}
