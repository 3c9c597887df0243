//! Balance ledger

use crate::balance::Balance;
use crate::order::Principal;
use crate::store::LedgerStore;
use crate::Result;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Per-principal current/withdrawn totals
#[derive(Clone)]
pub struct BalanceLedger {
    store: Arc<dyn LedgerStore>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Add `amount` to current; the update is additive, never an overwrite
    pub async fn credit(&self, principal: &Principal, amount: Decimal) -> Result<Balance> {
        let balance = self.store.credit(principal, amount).await?;
        tracing::debug!("Credited {} to {}: {}", amount, principal, balance);
        Ok(balance)
    }

    /// Move `amount` from current to withdrawn if current covers it
    pub async fn debit(&self, principal: &Principal, amount: Decimal) -> Result<Balance> {
        let balance = self.store.debit(principal, amount).await?;
        tracing::debug!("Debited {} from {}: {}", amount, principal, balance);
        Ok(balance)
    }

    pub async fn get(&self, principal: &Principal) -> Result<Balance> {
        self.store.balance(principal).await
    }
}
