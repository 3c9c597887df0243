//! Order registry

use crate::order::{Order, OrderNumber, Principal, RegisterOutcome};
use crate::store::LedgerStore;
use crate::{LoyaltyServiceError, Result};
use std::sync::Arc;

/// Durable order records keyed by globally unique number
#[derive(Clone)]
pub struct OrderRegistry {
    store: Arc<dyn LedgerStore>,
}

impl OrderRegistry {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register an order as NEW for `principal`
    ///
    /// Re-registering one's own number is a no-op; a number owned by someone
    /// else is an [`LoyaltyServiceError::OrderConflict`].
    pub async fn register(
        &self,
        number: OrderNumber,
        principal: &Principal,
    ) -> Result<RegisterOutcome> {
        let order = Order::new(number, principal.clone());
        if self.store.insert_order(&order).await? {
            tracing::info!("Order {} registered by {}", order.number, principal);
            return Ok(RegisterOutcome::Accepted);
        }

        match self.store.order_owner(&order.number).await? {
            Some(owner) if &owner == principal => Ok(RegisterOutcome::AlreadyRegistered),
            Some(_) => Err(LoyaltyServiceError::OrderConflict { number: order.number.to_string() }),
            None => Err(LoyaltyServiceError::Internal {
                message: format!("Order {} rejected as duplicate but has no owner", order.number),
            }),
        }
    }

    /// Orders of `principal` awaiting a final accrual decision
    pub async fn list_pending(&self, principal: &Principal) -> Result<Vec<Order>> {
        self.store.pending_orders(principal).await
    }

    /// All orders of `principal`, newest first
    pub async fn list_all(&self, principal: &Principal) -> Result<Vec<Order>> {
        self.store.orders(principal).await
    }
}
