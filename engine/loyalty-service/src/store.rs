//! Storage capability and the in-memory backend

use crate::balance::Balance;
use crate::order::{Order, OrderNumber, OrderUpdate, Principal};
use crate::withdrawal::WithdrawalRecord;
use crate::{LoyaltyServiceError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Abstract trait for ledger storage backends
///
/// Every method that changes more than one row is atomic: either all of its
/// writes become visible or none do.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a user; returns false when the login is taken
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<bool>;

    /// Stored password hash for a login
    async fn password_hash(&self, login: &str) -> Result<Option<String>>;

    /// Insert a NEW order; returns false when the number already exists
    async fn insert_order(&self, order: &Order) -> Result<bool>;

    /// Current owner of an order number
    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<Principal>>;

    /// All orders of a principal, newest first
    async fn orders(&self, owner: &Principal) -> Result<Vec<Order>>;

    /// Orders of a principal still NEW or PROCESSING
    async fn pending_orders(&self, owner: &Principal) -> Result<Vec<Order>>;

    /// Apply staged status changes and add `credit` to the balance in one transaction
    ///
    /// Each update only applies to an order that is still pending; if any
    /// order already left the pending states the whole batch is rolled back
    /// with [`LoyaltyServiceError::StaleOrderBatch`].
    async fn apply_accruals(
        &self,
        owner: &Principal,
        updates: &[OrderUpdate],
        credit: Decimal,
    ) -> Result<Balance>;

    /// Add points to the balance, creating it if needed
    async fn credit(&self, owner: &Principal, amount: Decimal) -> Result<Balance>;

    /// Move points from current to withdrawn if sufficient
    async fn debit(&self, owner: &Principal, amount: Decimal) -> Result<Balance>;

    /// Debit and append the withdrawal record in one transaction
    async fn withdraw(&self, record: &WithdrawalRecord) -> Result<Balance>;

    /// Balance of a principal; zero when never touched
    async fn balance(&self, owner: &Principal) -> Result<Balance>;

    /// Withdrawal records of a principal in storage order
    async fn withdrawals(&self, owner: &Principal) -> Result<Vec<WithdrawalRecord>>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, String>,
    orders: HashMap<OrderNumber, Order>,
    balances: HashMap<Principal, Balance>,
    history: Vec<WithdrawalRecord>,
}

/// In-memory storage backend (for testing and local runs)
///
/// A single mutex guards all tables, which makes every operation a transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    fail_accrual_batches: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `apply_accruals` call fail before writing anything
    pub fn fail_accrual_batches(&self, fail: bool) {
        self.fail_accrual_batches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(login) {
            return Ok(false);
        }
        state.users.insert(login.to_string(), password_hash.to_string());
        Ok(true)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.users.get(login).cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.number) {
            return Ok(false);
        }
        state.orders.insert(order.number.clone(), order.clone());
        Ok(true)
    }

    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<Principal>> {
        let state = self.state.lock().await;
        Ok(state.orders.get(number).map(|order| order.owner.clone()))
    }

    async fn orders(&self, owner: &Principal) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> =
            state.orders.values().filter(|order| &order.owner == owner).cloned().collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn pending_orders(&self, owner: &Principal) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|order| &order.owner == owner && order.status.is_pending())
            .cloned()
            .collect())
    }

    async fn apply_accruals(
        &self,
        owner: &Principal,
        updates: &[OrderUpdate],
        credit: Decimal,
    ) -> Result<Balance> {
        if self.fail_accrual_batches.load(Ordering::SeqCst) {
            return Err(LoyaltyServiceError::Internal {
                message: "injected accrual batch failure".to_string(),
            });
        }

        let mut state = self.state.lock().await;

        // Validate the whole batch before touching anything
        for update in updates {
            let pending = state
                .orders
                .get(&update.number)
                .map(|order| &order.owner == owner && order.status.is_pending())
                .unwrap_or(false);
            if !pending {
                return Err(LoyaltyServiceError::StaleOrderBatch {
                    number: update.number.to_string(),
                });
            }
        }

        let mut balance = state.balances.get(owner).copied().unwrap_or_default();
        balance.credit(credit)?;

        for update in updates {
            if let Some(order) = state.orders.get_mut(&update.number) {
                order.status = update.status;
                order.accrual = update.accrual;
            }
        }
        state.balances.insert(owner.clone(), balance);

        Ok(balance)
    }

    async fn credit(&self, owner: &Principal, amount: Decimal) -> Result<Balance> {
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(owner.clone()).or_default();
        balance.credit(amount)?;
        Ok(*balance)
    }

    async fn debit(&self, owner: &Principal, amount: Decimal) -> Result<Balance> {
        let mut state = self.state.lock().await;
        let mut balance = state.balances.get(owner).copied().unwrap_or_default();
        balance.debit(amount)?;
        state.balances.insert(owner.clone(), balance);
        Ok(balance)
    }

    async fn withdraw(&self, record: &WithdrawalRecord) -> Result<Balance> {
        let mut state = self.state.lock().await;

        let mut balance = state.balances.get(&record.owner).copied().unwrap_or_default();
        balance.debit(record.sum)?;

        if state.history.iter().any(|existing| existing.order == record.order) {
            return Err(LoyaltyServiceError::WithdrawalConflict {
                number: record.order.to_string(),
            });
        }

        state.balances.insert(record.owner.clone(), balance);
        state.history.push(record.clone());
        Ok(balance)
    }

    async fn balance(&self, owner: &Principal) -> Result<Balance> {
        let state = self.state.lock().await;
        Ok(state.balances.get(owner).copied().unwrap_or_default())
    }

    async fn withdrawals(&self, owner: &Principal) -> Result<Vec<WithdrawalRecord>> {
        let state = self.state.lock().await;
        Ok(state.history.iter().filter(|record| &record.owner == owner).cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
