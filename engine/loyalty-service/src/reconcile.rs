//! Order/accrual reconciliation

use crate::accrual::{AccrualOutcome, AccrualSource};
use crate::order::{OrderStatus, OrderUpdate, Principal};
use crate::registry::OrderRegistry;
use crate::store::LedgerStore;
use crate::Result;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Pending orders the accrual service was asked about
    pub polled: usize,
    /// Orders whose status advanced
    pub updated: usize,
    /// Points added to the balance
    pub credited: Decimal,
}

/// Pulls accrual decisions for a principal's pending orders and commits them
pub struct ReconciliationScheduler {
    registry: OrderRegistry,
    store: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualSource>,
    locks: DashMap<Principal, Arc<tokio::sync::Mutex<()>>>,
}

impl ReconciliationScheduler {
    pub fn new(store: Arc<dyn LedgerStore>, accrual: Arc<dyn AccrualSource>) -> Self {
        Self {
            registry: OrderRegistry::new(store.clone()),
            store,
            accrual,
            locks: DashMap::new(),
        }
    }

    fn principal_lock(&self, principal: &Principal) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(principal.clone()).or_default().clone()
    }

    /// Run one pass for `principal`
    ///
    /// Passes for the same principal never overlap. Status changes and the
    /// resulting credit are committed together or not at all.
    pub async fn run_for_principal(&self, principal: &Principal) -> Result<ReconcileReport> {
        let lock = self.principal_lock(principal);
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(principal).await
        };
        drop(lock);

        // Entries only live while some pass holds or waits on them
        self.locks.remove_if(principal, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn run_locked(&self, principal: &Principal) -> Result<ReconcileReport> {
        let pending = self.registry.list_pending(principal).await?;
        let mut report = ReconcileReport { polled: pending.len(), ..Default::default() };
        let mut updates = Vec::new();

        for order in &pending {
            match self.accrual.fetch(&order.number).await {
                AccrualOutcome::Success { status, accrual } => {
                    if !order.status.can_advance_to(status) {
                        tracing::debug!("Order {} unchanged at {}", order.number, order.status);
                        continue;
                    }
                    let accrual = if status == OrderStatus::Processed {
                        match report.credited.checked_add(accrual) {
                            Some(total) => report.credited = total,
                            None => {
                                tracing::warn!(
                                    "Accrual {} for order {} overflows this pass; left pending",
                                    accrual,
                                    order.number
                                );
                                continue;
                            }
                        }
                        Some(accrual)
                    } else {
                        None
                    };
                    tracing::debug!("Order {}: {} -> {}", order.number, order.status, status);
                    updates.push(OrderUpdate { number: order.number.clone(), status, accrual });
                }
                AccrualOutcome::RateLimited { retry_after } => {
                    tracing::warn!(
                        "Accrual service rate limited order {} (retry after {:?})",
                        order.number,
                        retry_after
                    );
                }
                other => {
                    tracing::warn!("Accrual lookup for order {} failed: {:?}", order.number, other);
                }
            }
        }

        if updates.is_empty() {
            return Ok(report);
        }

        if let Err(e) = self.store.apply_accruals(principal, &updates, report.credited).await {
            tracing::error!("Reconciliation for {} aborted: {}", principal, e);
            return Err(e);
        }

        report.updated = updates.len();
        tracing::info!(
            "Reconciled {}: {} polled, {} updated, {} credited",
            principal,
            report.polled,
            report.updated,
            report.credited
        );
        Ok(report)
    }
}
