//! Withdrawal history

use crate::balance::Balance;
use crate::order::{OrderNumber, Principal};
use crate::store::LedgerStore;
use crate::withdrawal::{sort_by_processed_at, WithdrawalRecord};
use crate::{LoyaltyServiceError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Append-only log of withdrawals
#[derive(Clone)]
pub struct WithdrawalHistory {
    store: Arc<dyn LedgerStore>,
}

impl WithdrawalHistory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Debit `sum` and record the withdrawal against `number` in one transaction
    pub async fn append(
        &self,
        number: OrderNumber,
        sum: Decimal,
        principal: &Principal,
    ) -> Result<Balance> {
        if sum <= Decimal::ZERO {
            return Err(LoyaltyServiceError::InvalidAmount { amount: sum });
        }

        let record = WithdrawalRecord::new(number, sum, principal.clone());
        let balance = self.store.withdraw(&record).await?;
        tracing::info!("Withdrawal of {} by {} for order {}", sum, principal, record.order);
        Ok(balance)
    }

    /// Withdrawals of `principal`, oldest first
    pub async fn list(&self, principal: &Principal) -> Result<Vec<WithdrawalRecord>> {
        let mut records = self.store.withdrawals(principal).await?;
        sort_by_processed_at(&mut records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, WithdrawalHistory) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), WithdrawalHistory::new(store))
    }

    #[tokio::test]
    async fn test_append_debits_and_records() {
        let (store, history) = setup();
        let alice = Principal::new("alice");
        store.credit(&alice, Decimal::from(500)).await.unwrap();

        let balance = history
            .append(OrderNumber::parse("2377225624").unwrap(), Decimal::from(100), &alice)
            .await
            .unwrap();

        assert_eq!(balance, Balance::new(Decimal::from(400), Decimal::from(100)));
        let records = history.list(&alice).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sum, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_insufficient_funds_appends_nothing() {
        let (store, history) = setup();
        let alice = Principal::new("alice");
        store.credit(&alice, Decimal::from(100)).await.unwrap();

        let err = history
            .append(OrderNumber::parse("2377225624").unwrap(), Decimal::from(150), &alice)
            .await
            .unwrap_err();

        assert!(matches!(err, LoyaltyServiceError::InsufficientFunds { .. }));
        assert!(history.list(&alice).await.unwrap().is_empty());
        assert_eq!(store.balance(&alice).await.unwrap().current, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_zero_sum_rejected() {
        let (_, history) = setup();
        let err = history
            .append(OrderNumber::parse("18").unwrap(), Decimal::ZERO, &Principal::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyServiceError::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn test_list_sorted_oldest_first() {
        let (store, history) = setup();
        let alice = Principal::new("alice");
        store.credit(&alice, Decimal::from(10)).await.unwrap();

        for raw in ["79927398713", "18", "0"] {
            history.append(OrderNumber::parse(raw).unwrap(), Decimal::ONE, &alice).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let records = history.list(&alice).await.unwrap();
        assert!(records.windows(2).all(|pair| pair[0].processed_at <= pair[1].processed_at));
        assert_eq!(records[0].order.as_str(), "79927398713");
    }
}
