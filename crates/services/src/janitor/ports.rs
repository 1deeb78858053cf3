use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::subscription::SubscriptionRecord;
use crate::types::CustomerId;

pub const DEFAULT_BUFFER_DAYS: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum JanitorError {
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<anyhow::Error> for JanitorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Write the janitor decided on for one customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JanitorAction {
    /// Trashed customer with a subscription still inside the buffer
    Restore,
    /// Replace the subscription list with the surviving records
    Prune(Vec<SubscriptionRecord>),
    /// Every subscription is past the buffer; trash and keep the history
    Trash,
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JanitorReport {
    pub scanned: usize,
    pub restored: Vec<CustomerId>,
    pub pruned: Vec<CustomerId>,
    pub trashed: Vec<CustomerId>,
    pub subscriptions_removed: usize,
}

impl JanitorReport {
    pub fn changed(&self) -> bool {
        !self.restored.is_empty() || !self.pruned.is_empty() || !self.trashed.is_empty()
    }
}

#[async_trait]
pub trait JanitorService: Send + Sync {
    /// One maintenance pass over every customer
    async fn run_pass(&self) -> Result<JanitorReport, JanitorError>;
}
