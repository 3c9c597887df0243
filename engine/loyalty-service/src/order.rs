//! Order numbers, statuses and order records

use crate::{LoyaltyServiceError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Principal owning orders, a balance and sessions (the user's login)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order number that passed the Luhn checksum
///
/// The only way to build one is [`OrderNumber::parse`], so holding an
/// `OrderNumber` means the digits were validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate raw input (surrounding whitespace is ignored)
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || !luhn_valid(digits)
        {
            return Err(LoyaltyServiceError::InvalidOrderNumber { number: raw.to_string() });
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = LoyaltyServiceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Luhn checksum over an all-digit string
fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Order status lifecycle: NEW -> PROCESSING -> PROCESSED | INVALID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// PROCESSED and INVALID never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `next` is a forward move; staying in place is not a transition
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        match self {
            OrderStatus::New => next != OrderStatus::New,
            OrderStatus::Processing => next.is_terminal(),
            OrderStatus::Processed | OrderStatus::Invalid => false,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = LoyaltyServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(LoyaltyServiceError::Internal {
                message: format!("Unknown order status {:?}", other),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order represents a purchase submitted for accrual
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Points awarded; only meaningful once the order is PROCESSED
    pub accrual: Option<Decimal>,
    pub owner: Principal,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly submitted order
    pub fn new(number: OrderNumber, owner: Principal) -> Self {
        Self { number, status: OrderStatus::New, accrual: None, owner, uploaded_at: Utc::now() }
    }
}

/// Result of registering an order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The order was stored as NEW
    Accepted,
    /// The same principal had already registered this number
    AlreadyRegistered,
}

/// Staged status change produced by a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub number: OrderNumber,
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luhn_valid_numbers() {
        for raw in ["79927398713", "4561261212345467", "0", "18", "12345678903"] {
            assert!(OrderNumber::parse(raw).is_ok(), "{} should be valid", raw);
        }
    }

    #[test]
    fn test_luhn_invalid_numbers() {
        for raw in ["79927398710", "4561261212345464", "12345678901", "1"] {
            assert!(
                matches!(
                    OrderNumber::parse(raw),
                    Err(LoyaltyServiceError::InvalidOrderNumber { .. })
                ),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_non_digit_input_rejected() {
        for raw in ["", "   ", "7992739871a", "-79927398713", "7992 7398713", "+18"] {
            assert!(OrderNumber::parse(raw).is_err(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        let number = OrderNumber::parse(" 79927398713\n").unwrap();
        assert_eq!(number.as_str(), "79927398713");
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(New.can_advance_to(Processing));
        assert!(New.can_advance_to(Processed));
        assert!(New.can_advance_to(Invalid));
        assert!(!New.can_advance_to(New));

        assert!(Processing.can_advance_to(Processed));
        assert!(Processing.can_advance_to(Invalid));
        assert!(!Processing.can_advance_to(Processing));
        assert!(!Processing.can_advance_to(New));

        for terminal in [Processed, Invalid] {
            for next in [New, Processing, Processed, Invalid] {
                assert!(!terminal.can_advance_to(next));
            }
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            OrderStatus::New,
            OrderStatus::Processing,
            OrderStatus::Processed,
            OrderStatus::Invalid,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("REGISTERED".parse::<OrderStatus>().is_err());
    }
}
