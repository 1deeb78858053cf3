use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::ports::{ReconciliationService, ReconciliationTrigger};

/// Runs a reconciliation pass after a mutation, never re-entrantly.
///
/// A trigger that arrives while a pass is running only marks the state dirty; the
/// running caller then performs exactly one follow-up pass. Failures are logged by
/// the pass itself and left for the next trigger or scheduled tick.
pub struct CoalescingTrigger {
    reconciliation: Arc<dyn ReconciliationService>,
    running: tokio::sync::Mutex<()>,
    pending: AtomicBool,
}

impl CoalescingTrigger {
    pub fn new(reconciliation: Arc<dyn ReconciliationService>) -> Self {
        Self {
            reconciliation,
            running: tokio::sync::Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReconciliationTrigger for CoalescingTrigger {
    async fn trigger(&self) {
        self.pending.store(true, Ordering::SeqCst);

        loop {
            let Ok(guard) = self.running.try_lock() else {
                tracing::debug!("Reconciliation already running, coalescing trigger");
                return;
            };

            if !self.pending.swap(false, Ordering::SeqCst) {
                return;
            }

            // Errors are already logged inside the pass
            let _ = self.reconciliation.run_pass().await;

            drop(guard);
            if !self.pending.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

/// Trigger that does nothing, for wiring without automatic reconciliation
pub struct NoopTrigger;

#[async_trait]
impl ReconciliationTrigger for NoopTrigger {
    async fn trigger(&self) {}
}
