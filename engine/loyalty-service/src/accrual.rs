//! Accrual service integration

use crate::config::AccrualConfig;
use crate::order::{OrderNumber, OrderStatus};
use crate::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// What one accrual query produced
///
/// Everything except `Success` is transient: the order stays pending and is
/// asked about again on the next reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    Success { status: OrderStatus, accrual: Decimal },
    RateLimited { retry_after: Option<Duration> },
    ServerError { status: u16 },
    NetworkError { message: String },
    Malformed { message: String },
}

impl AccrualOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AccrualOutcome::Success { .. })
    }
}

/// Source of accrual decisions for single orders
#[async_trait::async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome;
}

/// Largest reward accepted for a single order
pub const MAX_ACCRUAL: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Rewards are stored with this many decimal places
pub const ACCRUAL_SCALE: u32 = 4;

/// Accrual service response body
#[derive(Debug, Deserialize)]
pub struct AccrualResponse {
    #[serde(alias = "number")]
    pub order: String,
    pub status: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

/// Translate an accrual HTTP response into an outcome
pub fn interpret_response(number: &OrderNumber, status: u16, body: &str) -> AccrualOutcome {
    match status {
        200 => {}
        204 => {
            return AccrualOutcome::Malformed {
                message: format!("order {} is not registered with the accrual service", number),
            }
        }
        429 => return AccrualOutcome::RateLimited { retry_after: None },
        other => return AccrualOutcome::ServerError { status: other },
    }

    let response: AccrualResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => return AccrualOutcome::Malformed { message: format!("unparsable body: {}", e) },
    };

    if response.order != number.as_str() {
        return AccrualOutcome::Malformed {
            message: format!("asked for order {}, got {}", number, response.order),
        };
    }

    let status = match response.status.as_str() {
        "REGISTERED" | "PROCESSING" => OrderStatus::Processing,
        "PROCESSED" => OrderStatus::Processed,
        "INVALID" => OrderStatus::Invalid,
        other => {
            return AccrualOutcome::Malformed { message: format!("unknown status {:?}", other) }
        }
    };

    let accrual = response.accrual.unwrap_or_default();
    if accrual.is_sign_negative() && !accrual.is_zero() {
        return AccrualOutcome::Malformed { message: format!("negative accrual {}", accrual) };
    }

    if accrual > MAX_ACCRUAL {
        return AccrualOutcome::Malformed {
            message: format!("accrual {} exceeds {}", accrual, MAX_ACCRUAL),
        };
    }

    // Postgres rounds NUMERIC half away from zero; do the same before either store sees it
    let accrual =
        accrual.round_dp_with_strategy(ACCRUAL_SCALE, RoundingStrategy::MidpointAwayFromZero);

    AccrualOutcome::Success { status, accrual }
}

/// HTTP client for the accrual service
#[derive(Debug)]
pub struct HttpAccrualClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAccrualClient {
    /// Create a client whose every request is bounded by the configured timeout
    pub fn new(config: &AccrualConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { base_url: config.base_url(), client })
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait::async_trait]
impl AccrualSource for HttpAccrualClient {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        let url = self.order_url(number);
        tracing::debug!("Querying accrual service: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let message =
                    if e.is_timeout() { format!("timed out: {}", e) } else { e.to_string() };
                return AccrualOutcome::NetworkError { message };
            }
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return AccrualOutcome::NetworkError { message: e.to_string() },
        };

        match interpret_response(number, status, &body) {
            AccrualOutcome::RateLimited { .. } => AccrualOutcome::RateLimited { retry_after },
            outcome => outcome,
        }
    }
}

/// Accrual source answering from a fixed table (for testing and offline runs)
///
/// Orders without an entry answer `Malformed`, like an order the accrual
/// service has never heard of.
#[derive(Debug, Default)]
pub struct StaticAccrual {
    outcomes: parking_lot::RwLock<HashMap<String, AccrualOutcome>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl StaticAccrual {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for an order number
    pub fn set(&self, number: &str, outcome: AccrualOutcome) {
        self.outcomes.write().insert(number.to_string(), outcome);
    }

    /// Number of fetches served so far
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AccrualSource for StaticAccrual {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.outcomes.read().get(number.as_str()).cloned().unwrap_or_else(|| {
            AccrualOutcome::Malformed { message: format!("no accrual data for {}", number) }
        })
    }
}
