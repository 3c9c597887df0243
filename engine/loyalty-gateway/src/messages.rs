//! Message types for the LoyaltyGateway REST API

use loyalty_service::{Order, OrderStatus, WithdrawalRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Register and login request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Withdrawal request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Number of the purchase paid with points
    pub order: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
}

/// Order as listed to its owner
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
    /// RFC 3339
    pub uploaded_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        // Accrual is only reported once the order reached PROCESSED
        let accrual = match order.status {
            OrderStatus::Processed => order.accrual,
            _ => None,
        };
        Self {
            number: order.number.to_string(),
            status: order.status,
            accrual,
            uploaded_at: order.uploaded_at.to_rfc3339(),
        }
    }
}

/// Withdrawal history entry
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    /// RFC 3339
    pub processed_at: String,
}

impl From<WithdrawalRecord> for WithdrawalResponse {
    fn from(record: WithdrawalRecord) -> Self {
        Self {
            order: record.order.to_string(),
            sum: record.sum,
            processed_at: record.processed_at.to_rfc3339(),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_service::{OrderNumber, Principal};
    use std::str::FromStr;

    #[test]
    fn test_withdraw_request_accepts_integers_and_fractions() {
        let request: WithdrawRequest =
            serde_json::from_str(r#"{"order":"2377225624","sum":751}"#).unwrap();
        assert_eq!(request.sum, Decimal::from(751));

        let request: WithdrawRequest =
            serde_json::from_str(r#"{"order":"2377225624","sum":0.5}"#).unwrap();
        assert_eq!(request.sum, Decimal::from_str("0.5").unwrap());
    }

    #[test]
    fn test_new_order_omits_accrual() {
        let order = Order::new(OrderNumber::parse("79927398713").unwrap(), Principal::new("alice"));
        let json = serde_json::to_value(OrderResponse::from(order)).unwrap();

        assert_eq!(json["number"], "79927398713");
        assert_eq!(json["status"], "NEW");
        assert!(json.get("accrual").is_none());
        assert!(json["uploaded_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_processed_order_reports_accrual() {
        let mut order =
            Order::new(OrderNumber::parse("79927398713").unwrap(), Principal::new("alice"));
        order.status = OrderStatus::Processed;
        order.accrual = Some(Decimal::from_str("500.5").unwrap());

        let json = serde_json::to_value(OrderResponse::from(order)).unwrap();
        assert_eq!(json["status"], "PROCESSED");
        assert_eq!(json["accrual"].as_f64(), Some(500.5));
    }
}
