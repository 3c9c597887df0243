//! Error types for LoyaltyService

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoyaltyServiceError {
    #[error("Invalid order number: {number:?}")]
    InvalidOrderNumber { number: String },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("Order {number} is registered by another user")]
    OrderConflict { number: String },

    #[error("Order {number} was already used for a withdrawal")]
    WithdrawalConflict { number: String },

    #[error("Login already taken: {login}")]
    UserExists { login: String },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Session is missing or expired")]
    Unauthorized,

    #[error("Order {number} changed status concurrently, accrual batch rolled back")]
    StaleOrderBatch { number: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Password hashing error: {message}")]
    PasswordHash { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LoyaltyServiceError {
    /// True for errors caused by the caller's input rather than by the system.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrderNumber { .. }
                | Self::InvalidAmount { .. }
                | Self::OrderConflict { .. }
                | Self::WithdrawalConflict { .. }
                | Self::UserExists { .. }
                | Self::InsufficientFunds { .. }
                | Self::InvalidCredentials
                | Self::Unauthorized
        )
    }
}
