//! LoyaltyGateway - REST API for the loyalty points ledger
//!
//! This crate exposes LoyaltyService over HTTP and carries the process-level
//! concerns of the `loyalty-gateway` binary: configuration, logging, signal
//! handling and graceful shutdown.

pub mod config;
pub mod error;
pub mod logging;
pub mod messages;
pub mod rest_api;
pub mod signals;

pub use config::{Args, GatewayConfig};
pub use error::{ApiError, GatewayError};
pub use logging::initialize_logging;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Version of the LoyaltyGateway API
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
