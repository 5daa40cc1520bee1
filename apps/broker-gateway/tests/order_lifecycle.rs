//! Order Lifecycle Integration Tests
//!
//! Exercises the real REST client, session manager and order pipeline
//! together against a wiremock brokerage endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use broker_gateway::{
    BrokerHttpClient, BrokerSettings, ClassifiedError, ErrorKind, InMemoryOrderTracker,
    NoOpEventPublisher, OrderPipeline, OrderRequest, OrderStatus, OrderTracker, RiskCheck,
    RiskDecision, SessionManager, SessionSettings, ValidationLimits,
};
use broker_gateway::{ApiCredentials, OrderSide, OrderType, TimeInForce};

/// 16 zero bytes, base64-encoded: a valid AES-128 API code.
const TEST_API_KEY: &str = "API-AAAAAAAAAAAAAAAAAAAAAA==";

/// Risk collaborator that approves everything.
struct ApprovingRisk;

#[async_trait]
impl RiskCheck for ApprovingRisk {
    async fn validate_order_risk(
        &self,
        _request: &OrderRequest,
    ) -> Result<RiskDecision, ClassifiedError> {
        Ok(RiskDecision::approved())
    }
}

fn limit_buy_request() -> OrderRequest {
    OrderRequest {
        user_id: "user-1".to_string(),
        account_id: "ACCT0001".to_string(),
        symbol: "AKBNK".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        quantity: Decimal::new(100, 0),
        price: Some(Decimal::new(1725, 2)),
        stop_price: None,
        time_in_force: TimeInForce::Day,
        good_till_date: None,
        iceberg_quantity: None,
    }
}

async fn mount_login(server: &MockServer, expires_in_secs: i64) {
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(expires_in_secs);
    Mock::given(method("POST"))
        .and(path("/api/LoginUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "tok-1",
            "hash": "hash-1",
            "expires_at": expires_at.to_rfc3339(),
        })))
        .mount(server)
        .await;
}

async fn mount_ok(server: &MockServer, endpoint: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
}

async fn gateway(
    server: &MockServer,
    session_settings: SessionSettings,
) -> (
    Arc<BrokerHttpClient>,
    Arc<SessionManager<BrokerHttpClient>>,
    Arc<InMemoryOrderTracker>,
    OrderPipeline<BrokerHttpClient, ApprovingRisk, InMemoryOrderTracker, NoOpEventPublisher>,
) {
    let settings = BrokerSettings {
        base_url: server.uri(),
        ..BrokerSettings::default()
    };
    let credentials = ApiCredentials::new(TEST_API_KEY.to_string());
    let client = Arc::new(BrokerHttpClient::new(&settings, &credentials).unwrap());
    let session = Arc::new(SessionManager::new(Arc::clone(&client), session_settings));
    let tracker = Arc::new(InMemoryOrderTracker::new());
    let pipeline = OrderPipeline::new(
        Arc::clone(&client),
        Arc::new(ApprovingRisk),
        Arc::clone(&tracker),
        Arc::new(NoOpEventPublisher),
        Arc::clone(&session),
        ValidationLimits::default(),
    );
    (client, session, tracker, pipeline)
}

#[tokio::test]
async fn submit_limit_buy_end_to_end() {
    let server = MockServer::start().await;
    mount_login(&server, 3600).await;
    mount_ok(&server, "/api/Heartbeat").await;
    mount_ok(&server, "/api/LogoutUser").await;
    Mock::given(method("POST"))
        .and(path("/api/SendOrder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "order_id": "BRK-1001",
            "status": "NEW",
            "filled_quantity": "0",
        })))
        .mount(&server)
        .await;

    let (_client, session, tracker, pipeline) = gateway(&server, SessionSettings::default()).await;
    session.authenticate("trader", "şifre").await.unwrap();

    let order = pipeline.submit(limit_buy_request()).await.unwrap();

    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.broker_order_id.as_deref(), Some("BRK-1001"));
    assert_eq!(order.symbol, "AKBNK");

    // {userId}-{13 digit epoch millis}-{8 hex chars}
    let id_pattern = regex::Regex::new(r"^user-1-\d{13}-[0-9a-f]{8}$").unwrap();
    assert!(
        id_pattern.is_match(&order.client_order_id),
        "client order id: {}",
        order.client_order_id
    );

    assert!(tracker.find(&order.client_order_id).await.is_some());
    assert!(tracker.failure_of(&order.client_order_id).is_none());
}

#[tokio::test]
async fn rate_limited_submission_tracks_failure_not_submission() {
    let server = MockServer::start().await;
    mount_login(&server, 3600).await;
    mount_ok(&server, "/api/Heartbeat").await;
    mount_ok(&server, "/api/LogoutUser").await;
    Mock::given(method("POST"))
        .and(path("/api/SendOrder"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "30")
                .set_body_json(serde_json::json!({"message": "rate limit exceeded"})),
        )
        .mount(&server)
        .await;

    let (_client, session, tracker, pipeline) = gateway(&server, SessionSettings::default()).await;
    session.authenticate("trader", "şifre").await.unwrap();

    let err = pipeline.submit(limit_buy_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert_eq!(err.retry_after_secs, Some(30));

    let failed = tracker.failed_orders();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1, "rate limit exceeded");
}

#[tokio::test]
async fn heartbeat_exhaustion_logs_out_and_cancels_refresh() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await; // expires in 1s
    mount_ok(&server, "/api/LogoutUser").await;
    Mock::given(method("POST"))
        .and(path("/api/Heartbeat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;
    // The scheduled refresh must never fire once the heartbeat failure has
    // torn the session down.
    Mock::given(method("POST"))
        .and(path("/api/SessionRefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": "tok-2",
            "expires_at": (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        })))
        .expect(0)
        .mount(&server)
        .await;

    let settings = SessionSettings {
        heartbeat_interval: Duration::from_millis(30),
        refresh_buffer: Duration::from_millis(500), // refresh due at +500ms
        max_heartbeat_retries: 3,
        heartbeat_retry_backoff: Duration::from_millis(1),
    };
    let (_client, session, _tracker, _pipeline) = gateway(&server, settings).await;
    session.authenticate("trader", "şifre").await.unwrap();
    assert!(session.is_authenticated());

    // Three consecutive heartbeat failures force logout well before the
    // refresh point.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!session.is_authenticated());

    // Ride past the would-be refresh point; wiremock verifies expect(0).
    tokio::time::sleep(Duration::from_millis(500)).await;
    server.verify().await;
}

#[tokio::test]
async fn logout_twice_is_a_no_op() {
    let server = MockServer::start().await;
    mount_login(&server, 3600).await;
    mount_ok(&server, "/api/Heartbeat").await;
    Mock::given(method("POST"))
        .and(path("/api/LogoutUser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (_client, session, _tracker, _pipeline) = gateway(&server, SessionSettings::default()).await;
    session.authenticate("trader", "şifre").await.unwrap();

    session.logout().await;
    assert!(!session.is_authenticated());

    session.logout().await;
    assert!(!session.is_authenticated());

    server.verify().await;
}

#[tokio::test]
async fn cancel_order_end_to_end() {
    let server = MockServer::start().await;
    mount_login(&server, 3600).await;
    mount_ok(&server, "/api/Heartbeat").await;
    mount_ok(&server, "/api/LogoutUser").await;
    Mock::given(method("POST"))
        .and(path("/api/DeleteOrder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "order_id": "BRK-1001",
            "status": "CANCELLED",
        })))
        .mount(&server)
        .await;

    let (_client, session, _tracker, pipeline) = gateway(&server, SessionSettings::default()).await;
    session.authenticate("trader", "şifre").await.unwrap();

    let ack = pipeline.cancel("BRK-1001", "user-1").await.unwrap();
    assert_eq!(ack.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn order_rejection_surfaces_endpoint_reason() {
    let server = MockServer::start().await;
    mount_login(&server, 3600).await;
    mount_ok(&server, "/api/Heartbeat").await;
    mount_ok(&server, "/api/LogoutUser").await;
    Mock::given(method("POST"))
        .and(path("/api/SendOrder"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(serde_json::json!({"message": "insufficient collateral"})),
        )
        .mount(&server)
        .await;

    let (_client, session, tracker, pipeline) = gateway(&server, SessionSettings::default()).await;
    session.authenticate("trader", "şifre").await.unwrap();

    let err = pipeline.submit(limit_buy_request()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Order);
    assert_eq!(err.message, "insufficient collateral");

    let failed = tracker.failed_orders();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1, "insufficient collateral");
}
