//! Order Pipeline
//!
//! Orchestrates validate → risk-check → submit → track → publish for order
//! submission, cancellation and modification. Each step that can fail is
//! isolated: a tracking or publishing failure after a successful brokerage
//! call never invalidates the order — it is already live at the endpoint.
//!
//! The pipeline never retries a brokerage call on its own (duplicate-order
//! risk); retry policy belongs to the caller. Every failure leaving this
//! module is a [`ClassifiedError`].

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::ports::{BrokerApi, EventPublisher, OrderEvent, OrderTracker, RiskCheck};
use crate::application::validation::{self, ModifyRequest, OrderRequest};
use crate::domain::order::{Order, OrderStatus, TimeInForce};
use crate::infrastructure::broker::api_types::{
    OrderAck, OrderCancelPayload, OrderModifyPayload, OrderSubmitPayload,
};
use crate::infrastructure::broker::error::ClassifiedError;
use crate::infrastructure::config::ValidationLimits;
use crate::infrastructure::session::SessionManager;

/// The order pipeline, generic over the collaborators it drives.
pub struct OrderPipeline<B, R, T, E>
where
    B: BrokerApi,
    R: RiskCheck,
    T: OrderTracker,
    E: EventPublisher,
{
    broker: Arc<B>,
    risk: Arc<R>,
    tracker: Arc<T>,
    publisher: Arc<E>,
    session: Arc<SessionManager<B>>,
    limits: ValidationLimits,
}

impl<B, R, T, E> OrderPipeline<B, R, T, E>
where
    B: BrokerApi + 'static,
    R: RiskCheck,
    T: OrderTracker,
    E: EventPublisher,
{
    /// Create a pipeline over the given collaborators.
    pub fn new(
        broker: Arc<B>,
        risk: Arc<R>,
        tracker: Arc<T>,
        publisher: Arc<E>,
        session: Arc<SessionManager<B>>,
        limits: ValidationLimits,
    ) -> Self {
        Self {
            broker,
            risk,
            tracker,
            publisher,
            session,
            limits,
        }
    }

    /// Submit an order: validate, risk-check, execute, track, publish.
    ///
    /// # Errors
    ///
    /// Returns a classified error for every failure mode; local tracking
    /// state reflects a submission failure before it propagates.
    pub async fn submit(&self, request: OrderRequest) -> Result<Order, ClassifiedError> {
        let result = validation::validate_submission(&request, &self.limits, Utc::now());
        if !result.valid {
            return Err(ClassifiedError::validation(result.joined()));
        }

        let decision = self.risk.validate_order_risk(&request).await?;
        if !decision.approved {
            let reason = decision
                .reason
                .unwrap_or_else(|| "rejected by risk management".to_string());
            return Err(ClassifiedError::order_rejected(reason));
        }

        let token = self
            .session
            .current_token()
            .ok_or_else(ClassifiedError::not_authenticated)?;

        let client_order_id = generate_client_order_id(&request.user_id);
        let now = Utc::now();
        let mut order = Order {
            client_order_id: client_order_id.clone(),
            broker_order_id: None,
            user_id: request.user_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            status: OrderStatus::New,
            filled_quantity: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };

        self.tracker.start_tracking(&order).await;

        let payload = OrderSubmitPayload {
            symbol: request.symbol,
            side: request.side.to_string(),
            order_type: order_type_tag(request.order_type),
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            time_in_force: time_in_force_tag(request.time_in_force),
            client_order_id: client_order_id.clone(),
            good_till_date: request.good_till_date,
            iceberg_quantity: request.iceberg_quantity,
        };

        let ack = match self.broker.submit_order(&token, payload).await {
            Ok(ack) => ack,
            Err(err) => {
                self.tracker
                    .mark_order_failed(&client_order_id, &err.message)
                    .await;
                self.publish_best_effort(OrderEvent::Rejected {
                    client_order_id,
                    reason: err.message.clone(),
                })
                .await;
                return Err(err);
            }
        };

        self.apply_ack(&mut order, &ack);
        self.tracker.update_order(&order).await;
        self.publish_best_effort(OrderEvent::Submitted {
            order: order.clone(),
        })
        .await;

        tracing::info!(
            client_order_id = %order.client_order_id,
            broker_order_id = ?order.broker_order_id,
            symbol = %order.symbol,
            status = %order.status,
            "Order submitted"
        );

        Ok(order)
    }

    /// Cancel a working order. Returns the endpoint acknowledgment.
    pub async fn cancel(&self, order_id: &str, user_id: &str) -> Result<OrderAck, ClassifiedError> {
        let result = validation::validate_cancellation(order_id, user_id);
        if !result.valid {
            return Err(ClassifiedError::validation(result.joined()));
        }

        let token = self
            .session
            .current_token()
            .ok_or_else(ClassifiedError::not_authenticated)?;

        let payload = OrderCancelPayload {
            order_id: order_id.to_string(),
        };
        let ack = self.broker.cancel_order(&token, payload).await?;

        self.reconcile_ack(&ack).await;
        self.publish_best_effort(OrderEvent::Cancelled {
            client_order_id: ack
                .client_order_id
                .clone()
                .unwrap_or_else(|| order_id.to_string()),
            broker_order_id: Some(ack.order_id.clone()),
        })
        .await;

        tracing::info!(order_id, status = %ack.status, "Order cancelled");
        Ok(ack)
    }

    /// Modify a working order. Returns the endpoint acknowledgment.
    pub async fn modify(
        &self,
        order_id: &str,
        request: ModifyRequest,
    ) -> Result<OrderAck, ClassifiedError> {
        // The filled quantity of the tracked order bounds the new quantity.
        let filled = match self.tracker.find(order_id).await {
            Some(order) => order.filled_quantity,
            None => Decimal::ZERO,
        };

        let result =
            validation::validate_modification(order_id, &request, filled, &self.limits, Utc::now());
        if !result.valid {
            return Err(ClassifiedError::validation(result.joined()));
        }

        let token = self
            .session
            .current_token()
            .ok_or_else(ClassifiedError::not_authenticated)?;

        let payload = OrderModifyPayload {
            order_id: order_id.to_string(),
            quantity: request.new_quantity,
            price: request.new_price,
            stop_price: request.new_stop_price,
            good_till_date: request.new_good_till_date,
        };
        let ack = self.broker.modify_order(&token, payload).await?;

        self.reconcile_ack(&ack).await;
        self.publish_best_effort(OrderEvent::Modified {
            broker_order_id: ack.order_id.clone(),
        })
        .await;

        tracing::info!(order_id, status = %ack.status, "Order modified");
        Ok(ack)
    }

    /// Fetch the user's active orders from the endpoint.
    pub async fn active_orders(&self, user_id: &str) -> Result<Vec<OrderAck>, ClassifiedError> {
        let token = self
            .session
            .current_token()
            .ok_or_else(ClassifiedError::not_authenticated)?;
        self.broker.active_orders(&token, user_id).await
    }

    /// Apply a synchronous endpoint acknowledgment to a local order.
    fn apply_ack(&self, order: &mut Order, ack: &OrderAck) {
        let now = Utc::now();
        order.acknowledge(ack.order_id.clone(), now);
        if ack.status != order.status
            && let Err(err) = order.apply_status(ack.status, now)
        {
            tracing::warn!(
                client_order_id = %order.client_order_id,
                error = %err,
                "Acknowledged status not applicable locally"
            );
        }
        if ack.filled_quantity > Decimal::ZERO
            && let Err(err) = order.apply_fill(ack.filled_quantity, now)
        {
            tracing::warn!(
                client_order_id = %order.client_order_id,
                error = %err,
                "Acknowledged fill not applicable locally"
            );
        }
    }

    /// Fold an acknowledgment for an already-tracked order back into tracking.
    async fn reconcile_ack(&self, ack: &OrderAck) {
        let Some(client_order_id) = ack.client_order_id.as_deref() else {
            return;
        };
        let Some(mut order) = self.tracker.find(client_order_id).await else {
            return;
        };
        self.apply_ack(&mut order, ack);
        self.tracker.update_order(&order).await;
    }

    /// Publish an event; failures are logged, never propagated.
    async fn publish_best_effort(&self, event: OrderEvent) {
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(error = %err, "Event publish failed");
        }
    }
}

/// Generate a client order id: `{userId}-{epochMillis}-{8 hex chars}`.
#[must_use]
pub fn generate_client_order_id(user_id: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        user_id,
        Utc::now().timestamp_millis(),
        &uuid[..8]
    )
}

/// Wire tag for an order type.
fn order_type_tag(order_type: crate::domain::order::OrderType) -> String {
    use crate::domain::order::OrderType;
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::Stop => "STOP",
        OrderType::StopLimit => "STOP_LIMIT",
        OrderType::Iceberg => "ICEBERG",
        OrderType::AllOrNone => "ALL_OR_NONE",
        OrderType::FillOrKill => "FILL_OR_KILL",
        OrderType::ImmediateOrCancel => "IMMEDIATE_OR_CANCEL",
    }
    .to_string()
}

/// Wire tag for a time-in-force value.
fn time_in_force_tag(tif: TimeInForce) -> String {
    match tif {
        TimeInForce::Day => "DAY",
        TimeInForce::GoodTillCancelled => "GOOD_TILL_CANCELLED",
        TimeInForce::GoodTillDate => "GOOD_TILL_DATE",
        TimeInForce::ImmediateOrCancel => "IMMEDIATE_OR_CANCEL",
        TimeInForce::FillOrKill => "FILL_OR_KILL",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        InMemoryOrderTracker, MockBrokerApi, MockRiskCheck, NoOpEventPublisher, RiskDecision,
    };
    use crate::domain::order::{OrderSide, OrderType};
    use crate::infrastructure::broker::api_types::AuthResponse;
    use crate::infrastructure::broker::error::ErrorKind;
    use crate::infrastructure::config::SessionSettings;
    use chrono::Duration;
    use std::sync::LazyLock;

    static ID_PATTERN: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z0-9-_]+-\d{13}-[0-9a-f]{8}$").unwrap());

    type TestPipeline =
        OrderPipeline<MockBrokerApi, MockRiskCheck, InMemoryOrderTracker, NoOpEventPublisher>;

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

    fn auth_response() -> AuthResponse {
        AuthResponse {
            token: "tok-1".to_string(),
            hash: Some("hash-1".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn approving_risk() -> MockRiskCheck {
        let mut risk = MockRiskCheck::new();
        risk.expect_validate_order_risk()
            .returning(|_| Ok(RiskDecision::approved()));
        risk
    }

    /// Broker mock primed for the session manager's login + background calls.
    fn broker_for_session() -> MockBrokerApi {
        let mut broker = MockBrokerApi::new();
        broker.expect_login().returning(|_, _| Ok(auth_response()));
        broker.expect_heartbeat().returning(|_| Ok(()));
        broker.expect_logout().returning(|_| Ok(()));
        broker
    }

    async fn build_pipeline(
        broker: MockBrokerApi,
        risk: MockRiskCheck,
        tracker: Arc<InMemoryOrderTracker>,
        authenticate: bool,
    ) -> TestPipeline {
        let broker = Arc::new(broker);
        let session = Arc::new(SessionManager::new(
            Arc::clone(&broker),
            SessionSettings::default(),
        ));
        if authenticate {
            session.authenticate("user", "pass").await.unwrap();
        }
        OrderPipeline::new(
            broker,
            Arc::new(risk),
            tracker,
            Arc::new(NoOpEventPublisher),
            session,
            ValidationLimits::default(),
        )
    }

    #[tokio::test]
    async fn submit_success_yields_new_order_with_well_formed_id() {
        let mut broker = broker_for_session();
        broker.expect_submit_order().returning(|_, payload| {
            Ok(OrderAck {
                order_id: "BRK-1".to_string(),
                client_order_id: Some(payload.client_order_id),
                status: OrderStatus::New,
                filled_quantity: Decimal::ZERO,
                message: None,
            })
        });

        let tracker = Arc::new(InMemoryOrderTracker::new());
        let pipeline = build_pipeline(broker, approving_risk(), Arc::clone(&tracker), true).await;

        let order = pipeline.submit(limit_buy_request()).await.unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.broker_order_id.as_deref(), Some("BRK-1"));
        assert!(
            ID_PATTERN.is_match(&order.client_order_id),
            "id: {}",
            order.client_order_id
        );
        assert!(tracker.find(&order.client_order_id).await.is_some());
        assert!(tracker.failure_of(&order.client_order_id).is_none());
    }

    #[tokio::test]
    async fn submit_invalid_request_fails_without_remote_call() {
        let tracker = Arc::new(InMemoryOrderTracker::new());
        // Risk mock with no expectations: a call would panic the test.
        let pipeline = build_pipeline(
            broker_for_session(),
            MockRiskCheck::new(),
            Arc::clone(&tracker),
            true,
        )
        .await;

        let request = OrderRequest {
            symbol: "bad".to_string(),
            ..limit_buy_request()
        };
        let err = pipeline.submit(request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn submit_risk_rejection_short_circuits_with_reason() {
        let mut risk = MockRiskCheck::new();
        risk.expect_validate_order_risk()
            .returning(|_| Ok(RiskDecision::rejected("position limit breached")));

        let tracker = Arc::new(InMemoryOrderTracker::new());
        let pipeline =
            build_pipeline(broker_for_session(), risk, Arc::clone(&tracker), true).await;

        let err = pipeline.submit(limit_buy_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Order);
        assert_eq!(err.message, "position limit breached");
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn submit_broker_rate_limit_marks_tracking_failed() {
        let mut broker = broker_for_session();
        broker.expect_submit_order().returning(|_, _| {
            Err(ClassifiedError::from_status(429, "rate limit exceeded").with_retry_after(30))
        });

        let tracker = Arc::new(InMemoryOrderTracker::new());
        let pipeline = build_pipeline(broker, approving_risk(), Arc::clone(&tracker), true).await;

        let err = pipeline.submit(limit_buy_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(err.retry_after_secs, Some(30));

        // The tracked order reflects the failure, not a submission.
        let failed = tracker.failed_orders();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1, "rate limit exceeded");
    }

    #[tokio::test]
    async fn submit_without_session_is_authentication_error() {
        let tracker = Arc::new(InMemoryOrderTracker::new());
        let pipeline = build_pipeline(
            MockBrokerApi::new(),
            approving_risk(),
            Arc::clone(&tracker),
            false,
        )
        .await;

        let err = pipeline.submit(limit_buy_request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn cancel_updates_tracked_order_and_returns_ack() {
        let mut broker = broker_for_session();
        broker.expect_submit_order().returning(|_, payload| {
            Ok(OrderAck {
                order_id: "BRK-7".to_string(),
                client_order_id: Some(payload.client_order_id),
                status: OrderStatus::New,
                filled_quantity: Decimal::ZERO,
                message: None,
            })
        });
        broker.expect_cancel_order().returning(|_, payload| {
            Ok(OrderAck {
                order_id: payload.order_id,
                client_order_id: None,
                status: OrderStatus::Cancelled,
                filled_quantity: Decimal::ZERO,
                message: None,
            })
        });

        let tracker = Arc::new(InMemoryOrderTracker::new());
        let pipeline = build_pipeline(broker, approving_risk(), Arc::clone(&tracker), true).await;

        let order = pipeline.submit(limit_buy_request()).await.unwrap();
        let ack = pipeline.cancel("BRK-7", &order.user_id).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_validates_preconditions() {
        let pipeline = build_pipeline(
            broker_for_session(),
            approving_risk(),
            Arc::new(InMemoryOrderTracker::new()),
            true,
        )
        .await;

        let err = pipeline.cancel("", "user-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn modify_requires_a_change() {
        let pipeline = build_pipeline(
            broker_for_session(),
            approving_risk(),
            Arc::new(InMemoryOrderTracker::new()),
            true,
        )
        .await;

        let err = pipeline
            .modify("BRK-1", ModifyRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn modify_sends_changed_fields() {
        let mut broker = broker_for_session();
        broker.expect_modify_order().returning(|_, payload| {
            assert_eq!(payload.quantity, Some(Decimal::new(150, 0)));
            Ok(OrderAck {
                order_id: payload.order_id,
                client_order_id: None,
                status: OrderStatus::New,
                filled_quantity: Decimal::ZERO,
                message: None,
            })
        });

        let pipeline = build_pipeline(
            broker,
            approving_risk(),
            Arc::new(InMemoryOrderTracker::new()),
            true,
        )
        .await;

        let request = ModifyRequest {
            new_quantity: Some(Decimal::new(150, 0)),
            ..Default::default()
        };
        let ack = pipeline.modify("BRK-1", request).await.unwrap();
        assert_eq!(ack.order_id, "BRK-1");
    }

    #[tokio::test]
    async fn active_orders_requires_session() {
        let pipeline = build_pipeline(
            MockBrokerApi::new(),
            approving_risk(),
            Arc::new(InMemoryOrderTracker::new()),
            false,
        )
        .await;

        let err = pipeline.active_orders("user-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[test]
    fn client_order_id_format() {
        let id = generate_client_order_id("trader7");
        assert!(ID_PATTERN.is_match(&id), "id: {id}");
        assert!(id.starts_with("trader7-"));
    }

    #[test]
    fn client_order_ids_are_unique() {
        let a = generate_client_order_id("u");
        let b = generate_client_order_id("u");
        assert_ne!(a, b);
    }
}
