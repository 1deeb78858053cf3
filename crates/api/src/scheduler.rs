//! Periodic maintenance: a janitor pass followed by a reconciliation pass.
//!
//! Failures are logged and left for the next tick, which starts from fresh state.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Outcome of one scheduled tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub janitor_ok: bool,
    pub reconciliation_ok: bool,
}

/// Run one janitor pass, then one reconciliation pass
pub async fn run_maintenance_tick(state: &AppState) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    match state.janitor_service.run_pass().await {
        Ok(report) => {
            outcome.janitor_ok = true;
            if report.changed() {
                tracing::info!(
                    scanned = report.scanned,
                    restored = report.restored.len(),
                    pruned = report.pruned.len(),
                    trashed = report.trashed.len(),
                    "Scheduled janitor pass changed customers"
                );
            }
        }
        Err(e) => tracing::error!("Scheduled janitor pass failed: {}", e),
    }

    // Reconcile even after a janitor failure; the two passes are independent
    match state.reconciliation_service.run_pass().await {
        Ok(report) => {
            outcome.reconciliation_ok = true;
            tracing::debug!(
                short_circuited = report.short_circuited,
                exits = report.exits_emitted,
                "Scheduled reconciliation pass finished"
            );
        }
        Err(e) => tracing::error!("Scheduled reconciliation pass failed: {}", e),
    }

    outcome
}

/// Spawn the maintenance loop; `None` when the interval is zero
pub fn spawn_maintenance(state: AppState, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("Maintenance scheduler disabled");
        return None;
    }

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Starting maintenance scheduler"
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_maintenance_tick(&state).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EngineRepositories;
    use chrono::{Duration as ChronoDuration, Utc};
    use services::{
        customer::Customer,
        subscription::SubscriptionRecord,
        test_helpers::{
            InMemoryAuditStateRepository, InMemoryCredentialRepository,
            InMemoryCustomerRepository,
        },
    };
    use std::sync::Arc;

    struct Fixture {
        state: AppState,
        customers: Arc<InMemoryCustomerRepository>,
    }

    fn fixture() -> Fixture {
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let mut config = config::Config::default();
        config.engine.janitor_buffer_days = 5;
        let state = AppState::build(
            EngineRepositories {
                customers: customers.clone(),
                credentials: Arc::new(InMemoryCredentialRepository::default()),
                audit_state: Arc::new(InMemoryAuditStateRepository::default()),
            },
            &config,
        );
        Fixture { state, customers }
    }

    #[tokio::test]
    async fn test_tick_runs_janitor_then_reconciliation() {
        let fx = fixture();
        let mut customer = Customer::new("3001", "Lapsed");
        customer.subscriptions.push(SubscriptionRecord::new(
            "Viki",
            Utc::now() - ChronoDuration::days(60),
            1,
        ));
        fx.customers.insert(customer.clone());

        let outcome = run_maintenance_tick(&fx.state).await;
        assert_eq!(
            outcome,
            TickOutcome {
                janitor_ok: true,
                reconciliation_ok: true,
            }
        );
        assert!(fx.customers.get(customer.id).map(|c| c.deleted).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_janitor_failure_does_not_skip_reconciliation() {
        let fx = fixture();
        let mut customer = Customer::new("3001", "Lapsed");
        customer.subscriptions.push(SubscriptionRecord::new(
            "Viki",
            Utc::now() - ChronoDuration::days(60),
            1,
        ));
        fx.customers.insert(customer);
        fx.customers.fail_writes(true);

        let outcome = run_maintenance_tick(&fx.state).await;
        assert!(!outcome.janitor_ok);
        assert!(outcome.reconciliation_ok);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_scheduler() {
        let fx = fixture();
        assert!(spawn_maintenance(fx.state, Duration::ZERO).is_none());
    }
}
