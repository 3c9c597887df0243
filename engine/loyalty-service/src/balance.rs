//! Balance type for the loyalty points ledger

use crate::{LoyaltyServiceError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance holds a principal's spendable points and the running total withdrawn
///
/// Both totals are non-negative. `withdrawn` never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn new(current: Decimal, withdrawn: Decimal) -> Self {
        Self { current, withdrawn }
    }

    /// Add accrued points
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(LoyaltyServiceError::InvalidAmount { amount });
        }
        self.current =
            self.current.checked_add(amount).ok_or(LoyaltyServiceError::InvalidAmount { amount })?;
        Ok(())
    }

    /// Move points from `current` to `withdrawn`; leaves the balance untouched on failure
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LoyaltyServiceError::InvalidAmount { amount });
        }
        if amount > self.current {
            return Err(LoyaltyServiceError::InsufficientFunds {
                requested: amount,
                available: self.current,
            });
        }
        let withdrawn =
            self.withdrawn.checked_add(amount).ok_or(LoyaltyServiceError::InvalidAmount { amount })?;
        self.current -= amount;
        self.withdrawn = withdrawn;
        Ok(())
    }

    /// Check if nothing was ever credited or withdrawn
    pub fn is_zero(&self) -> bool {
        self.current.is_zero() && self.withdrawn.is_zero()
    }
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "current={} withdrawn={}", self.current, self.withdrawn)
    }
}
