//! # LoyaltyService
//!
//! Loyalty-points ledger: principals submit purchase order numbers, an external
//! accrual service decides the reward per order, and accumulated points can be
//! withdrawn against new purchases.
//!
//! Reconciliation with the accrual service runs synchronously on the requests
//! that read or spend a balance; nothing polls in the background. The only
//! long-lived task is the session sweeper.

pub mod accrual;
pub mod balance;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod order;
pub mod pg_store;
pub mod reconcile;
pub mod registry;
pub mod service;
pub mod session;
pub mod store;
pub mod users;
pub mod withdrawal;


pub use config::LoyaltyServiceConfig;
pub use error::LoyaltyServiceError;
pub use service::LoyaltyService;

// Re-export commonly used types
pub use accrual::{AccrualOutcome, AccrualSource, HttpAccrualClient, StaticAccrual};
pub use balance::Balance;
pub use order::{Order, OrderNumber, OrderStatus, Principal, RegisterOutcome};
pub use reconcile::ReconcileReport;
pub use session::{Session, SessionDirectory, SessionLookup};
pub use store::{InMemoryStore, LedgerStore};
pub use withdrawal::WithdrawalRecord;

// Result type alias
pub type Result<T> = std::result::Result<T, LoyaltyServiceError>;
