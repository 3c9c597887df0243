//! Error types for the LoyaltyGateway

use loyalty_service::LoyaltyServiceError;
use thiserror::Error;
use warp::http::StatusCode;

/// Errors that can occur while starting or running the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(#[from] LoyaltyServiceError),
}

/// Request failures carried through warp rejections
#[derive(Debug)]
pub enum ApiError {
    /// The request body or its fields could not be used
    BadRequest(String),
    /// No valid session cookie
    Unauthorized,
    Service(LoyaltyServiceError),
}

impl warp::reject::Reject for ApiError {}

impl From<LoyaltyServiceError> for ApiError {
    fn from(err: LoyaltyServiceError) -> Self {
        match err {
            LoyaltyServiceError::Unauthorized => ApiError::Unauthorized,
            other => ApiError::Service(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Service(err) => match err {
                LoyaltyServiceError::InvalidOrderNumber { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LoyaltyServiceError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
                LoyaltyServiceError::OrderConflict { .. }
                | LoyaltyServiceError::WithdrawalConflict { .. }
                | LoyaltyServiceError::UserExists { .. } => StatusCode::CONFLICT,
                LoyaltyServiceError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                LoyaltyServiceError::InvalidCredentials | LoyaltyServiceError::Unauthorized => {
                    StatusCode::UNAUTHORIZED
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Service(err) => match err {
                LoyaltyServiceError::InvalidOrderNumber { .. } => "INVALID_ORDER_NUMBER",
                LoyaltyServiceError::InvalidAmount { .. } => "INVALID_AMOUNT",
                LoyaltyServiceError::OrderConflict { .. } => "ORDER_CONFLICT",
                LoyaltyServiceError::WithdrawalConflict { .. } => "WITHDRAWAL_CONFLICT",
                LoyaltyServiceError::UserExists { .. } => "LOGIN_TAKEN",
                LoyaltyServiceError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
                LoyaltyServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
                LoyaltyServiceError::Unauthorized => "UNAUTHORIZED",
                _ => "INTERNAL_ERROR",
            },
        }
    }

    /// Message safe to show to the client; internal failures stay generic
    pub fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Unauthorized => "Session is missing or expired".to_string(),
            ApiError::Service(err) if err.is_rejection() => err.to_string(),
            ApiError::Service(_) => "Internal server error".to_string(),
        }
    }
}

/// Result type for LoyaltyGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
