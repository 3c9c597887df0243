//! LoyaltyService implementation

use crate::accrual::{AccrualSource, HttpAccrualClient};
use crate::balance::Balance;
use crate::config::{LoyaltyServiceConfig, SessionConfig};
use crate::history::WithdrawalHistory;
use crate::ledger::BalanceLedger;
use crate::order::{Order, OrderNumber, Principal, RegisterOutcome};
use crate::pg_store::PgStore;
use crate::reconcile::{ReconcileReport, ReconciliationScheduler};
use crate::registry::OrderRegistry;
use crate::session::{Session, SessionDirectory, SessionLookup};
use crate::store::LedgerStore;
use crate::users::UserDirectory;
use crate::withdrawal::WithdrawalRecord;
use crate::{LoyaltyServiceError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;

/// LoyaltyService ties accounts, orders, accrual reconciliation and withdrawals together
pub struct LoyaltyService {
    store: Arc<dyn LedgerStore>,
    users: UserDirectory,
    registry: OrderRegistry,
    ledger: BalanceLedger,
    history: WithdrawalHistory,
    reconciler: ReconciliationScheduler,
    sessions: SessionDirectory,
}

impl LoyaltyService {
    /// Create a LoyaltyService backed by Postgres and the HTTP accrual service
    pub async fn new(config: LoyaltyServiceConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(PgStore::connect(&config.database).await?);
        let accrual = Arc::new(HttpAccrualClient::new(&config.accrual)?);

        Self::with_components(store, accrual, &config.session)
    }

    /// Assemble a service from explicit storage and accrual backends
    pub fn with_components(
        store: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualSource>,
        session: &SessionConfig,
    ) -> Result<Self> {
        Ok(Self {
            users: UserDirectory::new(store.clone()),
            registry: OrderRegistry::new(store.clone()),
            ledger: BalanceLedger::new(store.clone()),
            history: WithdrawalHistory::new(store.clone()),
            reconciler: ReconciliationScheduler::new(store.clone(), accrual),
            sessions: SessionDirectory::from_config(session)?,
            store,
        })
    }

    /// Create an account and open a session for it
    pub async fn register_user(&self, login: &str, password: &str) -> Result<Session> {
        let principal = self.users.register(login, password).await?;
        Ok(self.sessions.create(principal))
    }

    /// Check credentials and open a session
    pub async fn login(&self, login: &str, password: &str) -> Result<Session> {
        let principal = self.users.verify(login, password).await?;
        Ok(self.sessions.create(principal))
    }

    /// Resolve a session token to its principal
    pub fn authenticate(&self, token: &str) -> Result<Principal> {
        match self.sessions.lookup(token) {
            SessionLookup::Active(session) => Ok(session.principal),
            SessionLookup::Expired | SessionLookup::NotFound => Err(LoyaltyServiceError::Unauthorized),
        }
    }

    /// Validate and register an order number
    pub async fn submit_order(&self, principal: &Principal, raw: &str) -> Result<RegisterOutcome> {
        let number = OrderNumber::parse(raw)?;
        self.registry.register(number, principal).await
    }

    pub async fn orders(&self, principal: &Principal) -> Result<Vec<Order>> {
        self.reconcile(principal).await?;
        self.registry.list_all(principal).await
    }

    pub async fn balance(&self, principal: &Principal) -> Result<Balance> {
        self.reconcile(principal).await?;
        self.ledger.get(principal).await
    }

    /// Spend `sum` points on the purchase `raw_number`
    pub async fn withdraw(&self, principal: &Principal, raw_number: &str, sum: Decimal) -> Result<Balance> {
        let number = OrderNumber::parse(raw_number)?;
        if sum <= Decimal::ZERO {
            return Err(LoyaltyServiceError::InvalidAmount { amount: sum });
        }

        self.reconcile(principal).await?;
        self.history.append(number, sum, principal).await
    }

    pub async fn withdrawals(&self, principal: &Principal) -> Result<Vec<WithdrawalRecord>> {
        self.reconcile(principal).await?;
        self.history.list(principal).await
    }

    /// Run a reconciliation pass for `principal`
    ///
    /// A batch rejected because another writer advanced one of its orders is
    /// not an error for the caller: nothing was committed and the next pass
    /// picks the remaining orders up again.
    pub async fn reconcile(&self, principal: &Principal) -> Result<ReconcileReport> {
        match self.reconciler.run_for_principal(principal).await {
            Err(LoyaltyServiceError::StaleOrderBatch { number }) => {
                tracing::warn!("Skipping stale accrual batch for {} (order {})", principal, number);
                Ok(ReconcileReport::default())
            }
            other => other,
        }
    }

    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await
    }
}
