//! Withdrawal records

use crate::order::{OrderNumber, Principal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// WithdrawalRecord is one entry of the append-only debit audit log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalRecord {
    /// Order paid with points; unique across the history
    pub order: OrderNumber,
    pub sum: Decimal,
    pub owner: Principal,
    pub processed_at: DateTime<Utc>,
}

impl WithdrawalRecord {
    pub fn new(order: OrderNumber, sum: Decimal, owner: Principal) -> Self {
        Self { order, sum, owner, processed_at: Utc::now() }
    }
}

/// Order records oldest first; the sort is stable so equal timestamps keep storage order
pub fn sort_by_processed_at(records: &mut [WithdrawalRecord]) {
    records.sort_by_key(|record| record.processed_at);
}
