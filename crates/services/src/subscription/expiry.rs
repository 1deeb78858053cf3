use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::codec::SubscriptionRecord;

/// Months are a fixed 30 days, not calendar months.
pub const DAYS_PER_MONTH: i64 = 30;

/// Days past expiry before a paid subscription is blocked
pub const DEFAULT_GRACE_DAYS: i64 = 3;

/// `start` plus `duration_months` fixed-length months; `None` past the representable range
pub fn expiry(start: DateTime<Utc>, duration_months: u32) -> Option<DateTime<Utc>> {
    let delta = Duration::try_days(i64::from(duration_months) * DAYS_PER_MONTH)?;
    start.checked_add_signed(delta)
}

/// Whole days between the UTC midnights of `now` and `expiry`.
/// Negative once the expiry day has passed.
pub fn days_remaining(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry.date_naive() - now.date_naive()).num_days()
}

/// Access classification of a single subscription
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Active,
    GracePeriod,
    Blocked,
}

impl AccessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessState::Active => "active",
            AccessState::GracePeriod => "grace_period",
            AccessState::Blocked => "blocked",
        }
    }

    pub fn has_access(&self) -> bool {
        !matches!(self, AccessState::Blocked)
    }
}

/// Computed state of a subscription at a point in time
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub expiry: DateTime<Utc>,
    pub days_remaining: i64,
    pub state: AccessState,
    pub debtor: bool,
    /// An explicit tolerance date is set and has not passed yet
    pub tolerance_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub grace_days: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            grace_days: DEFAULT_GRACE_DAYS,
        }
    }
}

impl ExpiryPolicy {
    pub fn new(grace_days: i64) -> Self {
        Self {
            grace_days: grace_days.max(0),
        }
    }

    /// Classify from already computed inputs.
    ///
    /// `override_expiration` (account-level) suppresses blocking entirely. An active
    /// tolerance date keeps access open past expiry regardless of the grace window.
    pub fn classify(
        &self,
        days_remaining: i64,
        paid: bool,
        override_expiration: bool,
        tolerance_active: bool,
    ) -> AccessState {
        if days_remaining >= 0 {
            return AccessState::Active;
        }
        if override_expiration || tolerance_active {
            return AccessState::GracePeriod;
        }
        if !paid || days_remaining < -self.grace_days {
            return AccessState::Blocked;
        }
        AccessState::GracePeriod
    }

    pub fn evaluate(
        &self,
        record: &SubscriptionRecord,
        override_expiration: bool,
        now: DateTime<Utc>,
    ) -> SubscriptionStatus {
        let expires_at = record.expiry();
        let remaining = days_remaining(expires_at, now);
        let tolerance_active = record
            .tolerance_until
            .map(|until| days_remaining(until, now) >= 0)
            .unwrap_or(false);

        SubscriptionStatus {
            expiry: expires_at,
            days_remaining: remaining,
            state: self.classify(remaining, record.paid, override_expiration, tolerance_active),
            debtor: record.is_debtor(),
            tolerance_active,
        }
    }
}
