//! Postgres storage backend

use crate::balance::Balance;
use crate::config::DatabaseConfig;
use crate::order::{Order, OrderNumber, OrderStatus, OrderUpdate, Principal};
use crate::store::LedgerStore;
use crate::withdrawal::WithdrawalRecord;
use crate::{LoyaltyServiceError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};

const UPSERT_CREDIT: &str = "INSERT INTO balance (username, current, withdrawn) VALUES ($1, $2, 0)
     ON CONFLICT (username) DO UPDATE SET current = balance.current + EXCLUDED.current
     RETURNING current, withdrawn";

const CONDITIONAL_DEBIT: &str = "UPDATE balance SET current = current - $2, withdrawn = withdrawn + $2
     WHERE username = $1 AND current >= $2
     RETURNING current, withdrawn";

#[derive(sqlx::FromRow)]
struct OrderRow {
    ordernum: String,
    username: String,
    accrual: Option<Decimal>,
    status: String,
    upload_time: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LoyaltyServiceError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            number: stored_number(&row.ordernum)?,
            status: row.status.parse::<OrderStatus>()?,
            accrual: row.accrual,
            owner: Principal(row.username),
            uploaded_at: row.upload_time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BalanceRow {
    current: Decimal,
    withdrawn: Decimal,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Balance::new(row.current, row.withdrawn)
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    ordernum: String,
    username: String,
    sum: Decimal,
    processed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for WithdrawalRecord {
    type Error = LoyaltyServiceError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(WithdrawalRecord {
            order: stored_number(&row.ordernum)?,
            sum: row.sum,
            owner: Principal(row.username),
            processed_at: row.processed_at,
        })
    }
}

fn stored_number(raw: &str) -> Result<OrderNumber> {
    OrderNumber::parse(raw).map_err(|_| LoyaltyServiceError::Internal {
        message: format!("Stored order number {:?} fails validation", raw),
    })
}

/// Postgres-backed ledger store
#[derive(Debug, Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Ledger database connected and migrated");

        Ok(Self { db_pool })
    }

    /// Wrap an existing pool (migrations are the caller's concern)
    pub fn from_pool(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn available(&self, owner: &Principal) -> Result<Decimal> {
        Ok(self.balance(owner).await?.current)
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2)
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(login)
        .bind(password_hash)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let hash: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE username = $1")
                .bind(login)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(hash.map(|(hash,)| hash))
    }

    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO orders (ordernum, username, accrual, status, upload_time)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (ordernum) DO NOTHING",
        )
        .bind(order.number.as_str())
        .bind(order.owner.as_str())
        .bind(order.accrual)
        .bind(order.status.as_str())
        .bind(order.uploaded_at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<Principal>> {
        let owner: Option<(String,)> =
            sqlx::query_as("SELECT username FROM orders WHERE ordernum = $1")
                .bind(number.as_str())
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(owner.map(|(login,)| Principal(login)))
    }

    async fn orders(&self, owner: &Principal) -> Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT ordernum, username, accrual, status, upload_time FROM orders
             WHERE username = $1 ORDER BY upload_time DESC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn pending_orders(&self, owner: &Principal) -> Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT ordernum, username, accrual, status, upload_time FROM orders
             WHERE username = $1 AND status IN ('NEW', 'PROCESSING')",
        )
        .bind(owner.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn apply_accruals(
        &self,
        owner: &Principal,
        updates: &[OrderUpdate],
        credit: Decimal,
    ) -> Result<Balance> {
        if credit.is_sign_negative() {
            return Err(LoyaltyServiceError::InvalidAmount { amount: credit });
        }

        let mut tx = self.db_pool.begin().await?;

        for update in updates {
            let result = sqlx::query(
                "UPDATE orders SET status = $1, accrual = $2
                 WHERE ordernum = $3 AND username = $4 AND status IN ('NEW', 'PROCESSING')",
            )
            .bind(update.status.as_str())
            .bind(update.accrual)
            .bind(update.number.as_str())
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(LoyaltyServiceError::StaleOrderBatch {
                    number: update.number.to_string(),
                });
            }
        }

        let row: BalanceRow = sqlx::query_as(UPSERT_CREDIT)
            .bind(owner.as_str())
            .bind(credit)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn credit(&self, owner: &Principal, amount: Decimal) -> Result<Balance> {
        if amount.is_sign_negative() {
            return Err(LoyaltyServiceError::InvalidAmount { amount });
        }

        let row: BalanceRow = sqlx::query_as(UPSERT_CREDIT)
            .bind(owner.as_str())
            .bind(amount)
            .fetch_one(&self.db_pool)
            .await?;

        Ok(row.into())
    }

    async fn debit(&self, owner: &Principal, amount: Decimal) -> Result<Balance> {
        if amount <= Decimal::ZERO {
            return Err(LoyaltyServiceError::InvalidAmount { amount });
        }

        let row: Option<BalanceRow> = sqlx::query_as(CONDITIONAL_DEBIT)
            .bind(owner.as_str())
            .bind(amount)
            .fetch_optional(&self.db_pool)
            .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(LoyaltyServiceError::InsufficientFunds {
                requested: amount,
                available: self.available(owner).await?,
            }),
        }
    }

    async fn withdraw(&self, record: &WithdrawalRecord) -> Result<Balance> {
        if record.sum <= Decimal::ZERO {
            return Err(LoyaltyServiceError::InvalidAmount { amount: record.sum });
        }

        let mut tx = self.db_pool.begin().await?;

        let row: Option<BalanceRow> = sqlx::query_as(CONDITIONAL_DEBIT)
            .bind(record.owner.as_str())
            .bind(record.sum)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(LoyaltyServiceError::InsufficientFunds {
                requested: record.sum,
                available: self.available(&record.owner).await?,
            });
        };

        let inserted = sqlx::query(
            "INSERT INTO history (ordernum, username, sum, processed_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (ordernum) DO NOTHING",
        )
        .bind(record.order.as_str())
        .bind(record.owner.as_str())
        .bind(record.sum)
        .bind(record.processed_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(LoyaltyServiceError::WithdrawalConflict { number: record.order.to_string() });
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn balance(&self, owner: &Principal) -> Result<Balance> {
        let row: Option<BalanceRow> =
            sqlx::query_as("SELECT current, withdrawn FROM balance WHERE username = $1")
                .bind(owner.as_str())
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(row.map(Balance::from).unwrap_or_default())
    }

    async fn withdrawals(&self, owner: &Principal) -> Result<Vec<WithdrawalRecord>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT ordernum, username, sum, processed_at FROM history WHERE username = $1",
        )
        .bind(owner.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(WithdrawalRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }
}
