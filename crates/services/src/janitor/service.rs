use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::ports::{JanitorAction, JanitorError, JanitorReport, JanitorService, DEFAULT_BUFFER_DAYS};
use crate::customer::{Customer, CustomerRepository};
use crate::subscription::days_remaining;

/// Decide what the janitor does with one customer, if anything.
///
/// A subscription survives while `days_remaining >= -buffer_days`. Running the plan
/// again on the written result yields `None`.
pub fn plan(customer: &Customer, now: DateTime<Utc>, buffer_days: i64) -> Option<JanitorAction> {
    let within_buffer = |expiry| days_remaining(expiry, now) >= -buffer_days;

    if customer.deleted {
        return customer
            .subscriptions
            .iter()
            .any(|s| within_buffer(s.expiry()))
            .then_some(JanitorAction::Restore);
    }

    let kept: Vec<_> = customer
        .subscriptions
        .iter()
        .filter(|s| within_buffer(s.expiry()))
        .cloned()
        .collect();

    if kept.len() == customer.subscriptions.len() {
        return None;
    }
    if kept.is_empty() {
        return Some(JanitorAction::Trash);
    }
    Some(JanitorAction::Prune(kept))
}

pub struct LifecycleJanitorConfig {
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub buffer_days: i64,
}

impl LifecycleJanitorConfig {
    pub fn new(customer_repo: Arc<dyn CustomerRepository>) -> Self {
        Self {
            customer_repo,
            buffer_days: DEFAULT_BUFFER_DAYS,
        }
    }
}

/// Restores trashed customers that still have usable time and prunes long-expired
/// subscriptions from active ones. Like reconciliation, the read-then-write sequence
/// is not isolated from concurrent writers.
pub struct LifecycleJanitor {
    customer_repo: Arc<dyn CustomerRepository>,
    buffer_days: i64,
}

impl LifecycleJanitor {
    pub fn new(config: LifecycleJanitorConfig) -> Self {
        Self {
            customer_repo: config.customer_repo,
            buffer_days: config.buffer_days,
        }
    }

    async fn apply(
        &self,
        customer: &Customer,
        action: JanitorAction,
        report: &mut JanitorReport,
    ) -> Result<(), JanitorError> {
        match action {
            JanitorAction::Restore => {
                self.customer_repo.set_deleted(customer.id, false).await?;
                tracing::info!(customer_id = %customer.id, "Restored trashed customer with active subscription");
                report.restored.push(customer.id);
            }
            JanitorAction::Prune(kept) => {
                let removed = customer.subscriptions.len() - kept.len();
                self.customer_repo
                    .update_subscriptions(customer.id, &kept)
                    .await?;
                tracing::info!(
                    customer_id = %customer.id,
                    removed,
                    "Pruned expired subscriptions"
                );
                report.subscriptions_removed += removed;
                report.pruned.push(customer.id);
            }
            JanitorAction::Trash => {
                // Subscription history stays on the row for audit
                self.customer_repo.set_deleted(customer.id, true).await?;
                tracing::info!(
                    customer_id = %customer.id,
                    subscriptions = customer.subscriptions.len(),
                    "Trashed customer with only expired subscriptions"
                );
                report.subscriptions_removed += customer.subscriptions.len();
                report.trashed.push(customer.id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JanitorService for LifecycleJanitor {
    async fn run_pass(&self) -> Result<JanitorReport, JanitorError> {
        let now = Utc::now();
        let customers = self.customer_repo.list_customers().await.map_err(|e| {
            tracing::error!(error = ?e, "Janitor failed to load customers");
            JanitorError::from(e)
        })?;

        let mut report = JanitorReport {
            scanned: customers.len(),
            ..Default::default()
        };

        for customer in &customers {
            let Some(action) = plan(customer, now, self.buffer_days) else {
                continue;
            };
            if let Err(e) = self.apply(customer, action, &mut report).await {
                tracing::error!(
                    error = ?e,
                    customer_id = %customer.id,
                    "Janitor pass aborted, waiting for next cycle"
                );
                return Err(e);
            }
        }

        if report.changed() {
            tracing::info!(
                scanned = report.scanned,
                restored = report.restored.len(),
                pruned = report.pruned.len(),
                trashed = report.trashed.len(),
                "Janitor pass completed"
            );
        }
        Ok(report)
    }
}
