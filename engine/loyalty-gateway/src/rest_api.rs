//! REST API endpoints for the LoyaltyGateway
//!
//! User registration and login, order submission and listing, balance,
//! withdrawals and a health probe. Authenticated routes read the
//! `session_token` cookie issued at registration or login.

use crate::error::ApiError;
use crate::messages::{
    Credentials, ErrorDetail, ErrorResponse, OrderResponse, WithdrawRequest, WithdrawalResponse,
};
use loyalty_service::{LoyaltyService, Principal, RegisterOutcome, Session};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_token";

fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

fn session_reply(session: &Session) -> Response {
    let max_age = (session.expires_at - chrono::Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}",
        SESSION_COOKIE, session.token, max_age
    );
    warp::reply::with_header(StatusCode::OK, "set-cookie", cookie).into_response()
}

fn check_credentials(credentials: &Credentials) -> Result<(), Rejection> {
    if credentials.login.trim().is_empty() || credentials.password.is_empty() {
        return Err(reject(ApiError::BadRequest("login and password are required".to_string())));
    }
    Ok(())
}

/// Register a user and log them in
pub async fn register(
    credentials: Credentials,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    check_credentials(&credentials)?;
    let session =
        service.register_user(&credentials.login, &credentials.password).await.map_err(reject)?;
    Ok(session_reply(&session))
}

/// Log a user in
pub async fn login(
    credentials: Credentials,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    check_credentials(&credentials)?;
    let session = service.login(&credentials.login, &credentials.password).await.map_err(reject)?;
    Ok(session_reply(&session))
}

/// Submit an order number (plain text body)
pub async fn submit_order(
    principal: Principal,
    body: warp::hyper::body::Bytes,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| reject(ApiError::BadRequest("order number must be text".to_string())))?;
    if raw.trim().is_empty() {
        return Err(reject(ApiError::BadRequest("order number is empty".to_string())));
    }

    let status = match service.submit_order(&principal, raw).await.map_err(reject)? {
        RegisterOutcome::Accepted => StatusCode::ACCEPTED,
        RegisterOutcome::AlreadyRegistered => StatusCode::OK,
    };
    Ok(status.into_response())
}

/// List the caller's orders, newest first
pub async fn list_orders(
    principal: Principal,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    let orders = service.orders(&principal).await.map_err(reject)?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let orders: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(warp::reply::json(&orders).into_response())
}

/// Current and withdrawn points
pub async fn get_balance(
    principal: Principal,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    let balance = service.balance(&principal).await.map_err(reject)?;
    Ok(warp::reply::json(&balance).into_response())
}

/// Spend points on a new order
pub async fn withdraw(
    principal: Principal,
    request: WithdrawRequest,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    service.withdraw(&principal, &request.order, request.sum).await.map_err(reject)?;
    Ok(StatusCode::OK.into_response())
}

/// Withdrawal history, oldest first
pub async fn list_withdrawals(
    principal: Principal,
    service: Arc<LoyaltyService>,
) -> Result<Response, Rejection> {
    let records = service.withdrawals(&principal).await.map_err(reject)?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let records: Vec<WithdrawalResponse> =
        records.into_iter().map(WithdrawalResponse::from).collect();
    Ok(warp::reply::json(&records).into_response())
}

/// Liveness plus store connectivity
pub async fn health(service: Arc<LoyaltyService>) -> Result<Response, Infallible> {
    let (status, state) = match service.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = warp::reply::json(&serde_json::json!({
        "status": state,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }));
    Ok(warp::reply::with_status(body, status).into_response())
}

/// Resolve the session cookie to a principal or reject with 401
fn with_principal(
    service: Arc<LoyaltyService>,
) -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |token: Option<String>| {
        let service = service.clone();
        async move {
            let token = token.ok_or_else(|| reject(ApiError::Unauthorized))?;
            service.authenticate(&token).map_err(reject)
        }
    })
}

/// Turn rejections into JSON error responses
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, code, message) = if let Some(api_error) = err.find::<ApiError>() {
        let status = api_error.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", api_error);
        }
        (status, api_error.code(), api_error.public_message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST", "Unsupported content type".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", "Request body too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "LENGTH_REQUIRED", "Content-Length required".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "Method not allowed".to_string())
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error".to_string())
    };

    let body = ErrorResponse {
        error: ErrorDetail { code: code.to_string(), message },
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

/// Order numbers are short digit strings; anything longer is refused before it is read
const MAX_ORDER_BODY_BYTES: u64 = 64;

/// Create REST API routes
pub fn create_routes(
    service: Arc<LoyaltyService>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let service_filter = {
        let service = service.clone();
        warp::any().map(move || service.clone())
    };
    let principal = with_principal(service);

    // Registration endpoint
    let register = warp::path!("api" / "user" / "register")
        .and(warp::post())
        .and(warp::body::json::<Credentials>())
        .and(service_filter.clone())
        .and_then(register);

    // Login endpoint
    let login = warp::path!("api" / "user" / "login")
        .and(warp::post())
        .and(warp::body::json::<Credentials>())
        .and(service_filter.clone())
        .and_then(login);

    // Order submission endpoint
    let submit_order = warp::path!("api" / "user" / "orders")
        .and(warp::post())
        .and(principal.clone())
        .and(warp::body::content_length_limit(MAX_ORDER_BODY_BYTES))
        .and(warp::body::bytes())
        .and(service_filter.clone())
        .and_then(submit_order);

    // Order listing endpoint
    let list_orders = warp::path!("api" / "user" / "orders")
        .and(warp::get())
        .and(principal.clone())
        .and(service_filter.clone())
        .and_then(list_orders);

    // Balance endpoint
    let balance = warp::path!("api" / "user" / "balance")
        .and(warp::get())
        .and(principal.clone())
        .and(service_filter.clone())
        .and_then(get_balance);

    // Withdrawal endpoint
    let withdraw = warp::path!("api" / "user" / "balance" / "withdraw")
        .and(warp::post())
        .and(principal.clone())
        .and(warp::body::json::<WithdrawRequest>())
        .and(service_filter.clone())
        .and_then(withdraw);

    // Withdrawal history endpoint
    let withdrawals = warp::path!("api" / "user" / "withdrawals")
        .and(warp::get())
        .and(principal)
        .and(service_filter.clone())
        .and_then(list_withdrawals);

    // Health check endpoint
    let health = warp::path!("health").and(warp::get()).and(service_filter).and_then(health);

    // Combine all routes
    register
        .or(login)
        .or(submit_order)
        .or(list_orders)
        .or(balance)
        .or(withdraw)
        .or(withdrawals)
        .or(health)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_service::config::SessionConfig;
    use loyalty_service::{AccrualOutcome, InMemoryStore, OrderStatus, StaticAccrual};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::str::FromStr;

    fn create_test_service() -> (Arc<LoyaltyService>, Arc<StaticAccrual>) {
        let accrual = Arc::new(StaticAccrual::new());
        let service = LoyaltyService::with_components(
            Arc::new(InMemoryStore::new()),
            accrual.clone(),
            &SessionConfig { ttl_seconds: 120, sweep_interval_seconds: 5 },
        )
        .unwrap();
        (Arc::new(service), accrual)
    }

    fn session_cookie(response: &warp::http::Response<warp::hyper::body::Bytes>) -> String {
        let header = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        header.split(';').next().unwrap().to_string()
    }

    fn body_json(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    async fn register_user(service: &Arc<LoyaltyService>, login: &str) -> String {
        let response = warp::test::request()
            .method("POST")
            .path("/api/user/register")
            .json(&json!({ "login": login, "password": "s3cret" }))
            .reply(&create_routes(service.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    #[tokio::test]
    async fn test_register_sets_cookie_and_rejects_duplicate() {
        let (service, _) = create_test_service();
        let routes = create_routes(service.clone());

        let cookie = register_user(&service, "alice").await;
        assert!(cookie.starts_with("session_token="));

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/register")
            .json(&json!({ "login": "alice", "password": "other" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(&response)["error"]["code"], "LOGIN_TAKEN");
    }

    #[tokio::test]
    async fn test_malformed_credentials_are_bad_requests() {
        let (service, _) = create_test_service();
        let routes = create_routes(service);

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/register")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/login")
            .json(&json!({ "login": "", "password": "x" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login() {
        let (service, _) = create_test_service();
        let routes = create_routes(service.clone());
        register_user(&service, "alice").await;

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/login")
            .json(&json!({ "login": "alice", "password": "s3cret" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).starts_with("session_token="));

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/login")
            .json(&json!({ "login": "alice", "password": "wrong" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authenticated_routes_require_session() {
        let (service, _) = create_test_service();
        let routes = create_routes(service);

        for (method, path) in [
            ("GET", "/api/user/orders"),
            ("GET", "/api/user/balance"),
            ("GET", "/api/user/withdrawals"),
            ("POST", "/api/user/orders"),
        ] {
            let response = warp::test::request()
                .method(method)
                .path(path)
                .body("79927398713")
                .reply(&routes)
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);
        }

        let response = warp::test::request()
            .method("GET")
            .path("/api/user/balance")
            .header("cookie", "session_token=forged")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_order_submission_statuses() {
        let (service, _) = create_test_service();
        let routes = create_routes(service.clone());
        let alice = register_user(&service, "alice").await;
        let bob = register_user(&service, "bob").await;

        let submit = |cookie: String, body: &str| {
            warp::test::request()
                .method("POST")
                .path("/api/user/orders")
                .header("cookie", cookie)
                .header("content-type", "text/plain")
                .body(body.to_string())
        };

        assert_eq!(submit(alice.clone(), "79927398713").reply(&routes).await.status(), 202);
        assert_eq!(submit(alice.clone(), "79927398713").reply(&routes).await.status(), 200);
        assert_eq!(submit(bob.clone(), "79927398713").reply(&routes).await.status(), 409);
        assert_eq!(submit(alice.clone(), "79927398710").reply(&routes).await.status(), 422);
        assert_eq!(submit(alice.clone(), "12ab").reply(&routes).await.status(), 422);
        assert_eq!(submit(alice.clone(), "  ").reply(&routes).await.status(), 400);

        let response = submit(alice, &"7".repeat(65)).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(&response)["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_orders_balance_and_withdrawals_flow() {
        let (service, accrual) = create_test_service();
        let routes = create_routes(service.clone());
        let alice = register_user(&service, "alice").await;

        let get = |path: &'static str, cookie: &str| {
            warp::test::request().method("GET").path(path).header("cookie", cookie.to_string())
        };

        assert_eq!(get("/api/user/orders", &alice).reply(&routes).await.status(), 204);
        assert_eq!(get("/api/user/withdrawals", &alice).reply(&routes).await.status(), 204);

        let response = warp::test::request()
            .method("POST")
            .path("/api/user/orders")
            .header("cookie", alice.clone())
            .body("79927398713")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        accrual.set(
            "79927398713",
            AccrualOutcome::Success {
                status: OrderStatus::Processed,
                accrual: Decimal::from_str("500.5").unwrap(),
            },
        );

        let response = get("/api/user/orders", &alice).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let orders = body_json(&response);
        assert_eq!(orders[0]["number"], "79927398713");
        assert_eq!(orders[0]["status"], "PROCESSED");
        assert_eq!(orders[0]["accrual"].as_f64(), Some(500.5));

        let balance = body_json(&get("/api/user/balance", &alice).reply(&routes).await);
        assert_eq!(balance["current"].as_f64(), Some(500.5));
        assert_eq!(balance["withdrawn"].as_f64(), Some(0.0));

        let withdraw = |order: &str, sum: f64| {
            warp::test::request()
                .method("POST")
                .path("/api/user/balance/withdraw")
                .header("cookie", alice.clone())
                .json(&json!({ "order": order, "sum": sum }))
        };

        assert_eq!(withdraw("2377225624", 1000.0).reply(&routes).await.status(), 402);
        assert_eq!(withdraw("2377225625", 10.0).reply(&routes).await.status(), 422);
        assert_eq!(withdraw("2377225624", -5.0).reply(&routes).await.status(), 400);
        // The order that earned the points can itself be paid for with them
        assert_eq!(withdraw("79927398713", 100.0).reply(&routes).await.status(), 200);
        assert_eq!(withdraw("79927398713", 1.0).reply(&routes).await.status(), 409);

        let balance = body_json(&get("/api/user/balance", &alice).reply(&routes).await);
        assert_eq!(balance["current"].as_f64(), Some(400.5));
        assert_eq!(balance["withdrawn"].as_f64(), Some(100.0));

        let response = get("/api/user/withdrawals", &alice).reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let records = body_json(&response);
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["order"], "79927398713");
        assert_eq!(records[0]["sum"].as_f64(), Some(100.0));
        assert!(records[0]["processed_at"].is_string());
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let (service, _) = create_test_service();
        let routes = create_routes(service);

        let response = warp::test::request().method("GET").path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["status"], "healthy");

        let response = warp::test::request().method("GET").path("/api/nope").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
