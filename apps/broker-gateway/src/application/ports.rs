//! Application Ports (Driven)
//!
//! Interfaces for the external systems the pipeline drives: the brokerage
//! REST API, the risk management service, the order tracking service, and
//! the event publisher.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::application::validation::OrderRequest;
use crate::domain::order::Order;
use crate::infrastructure::broker::api_types::{
    AuthResponse, OrderAck, OrderCancelPayload, OrderModifyPayload, OrderSubmitPayload,
};
use crate::infrastructure::broker::error::ClassifiedError;

// =============================================================================
// Broker API Port
// =============================================================================

/// Port for the brokerage REST endpoint.
///
/// Every method returns a [`ClassifiedError`] on failure — implementations
/// classify at the call boundary so no raw transport error escapes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Perform a login call. The implementation encrypts the password.
    async fn login(&self, username: &str, password: &str)
    -> Result<AuthResponse, ClassifiedError>;

    /// Refresh the session token.
    async fn refresh_session(&self, token: &str) -> Result<AuthResponse, ClassifiedError>;

    /// Send a session heartbeat.
    async fn heartbeat(&self, token: &str) -> Result<(), ClassifiedError>;

    /// Terminate the session at the endpoint.
    async fn logout(&self, token: &str) -> Result<(), ClassifiedError>;

    /// Submit an order.
    async fn submit_order(
        &self,
        token: &str,
        payload: OrderSubmitPayload,
    ) -> Result<OrderAck, ClassifiedError>;

    /// Modify a working order.
    async fn modify_order(
        &self,
        token: &str,
        payload: OrderModifyPayload,
    ) -> Result<OrderAck, ClassifiedError>;

    /// Cancel a working order.
    async fn cancel_order(
        &self,
        token: &str,
        payload: OrderCancelPayload,
    ) -> Result<OrderAck, ClassifiedError>;

    /// Fetch the user's active orders.
    async fn active_orders(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<OrderAck>, ClassifiedError>;
}

// =============================================================================
// Risk Check Port
// =============================================================================

/// Decision returned by the risk management service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Whether the order may proceed.
    pub approved: bool,
    /// Rejection reason when not approved.
    pub reason: Option<String>,
}

impl RiskDecision {
    /// An approving decision.
    #[must_use]
    pub const fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    /// A rejecting decision with a reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// Port for the risk management collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskCheck: Send + Sync {
    /// Evaluate an order request against risk limits.
    async fn validate_order_risk(
        &self,
        request: &OrderRequest,
    ) -> Result<RiskDecision, ClassifiedError>;
}

// =============================================================================
// Order Tracker Port
// =============================================================================

/// Port for the order tracking collaborator.
///
/// Tracking state must always reflect a failure before the pipeline
/// propagates it, so the two can never diverge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderTracker: Send + Sync {
    /// Begin tracking an order the pipeline is about to submit.
    async fn start_tracking(&self, order: &Order);

    /// Record an endpoint-acknowledged order state.
    async fn update_order(&self, order: &Order);

    /// Record a failed submission for an order.
    async fn mark_order_failed(&self, client_order_id: &str, reason: &str);

    /// Look up a tracked order by client order id.
    async fn find(&self, client_order_id: &str) -> Option<Order>;
}

/// Tracked order with its failure state, if any.
#[derive(Debug, Clone)]
struct TrackedOrder {
    order: Order,
    failure: Option<String>,
}

/// In-memory order tracker: the default wiring and the audit surface used by
/// tests.
#[derive(Debug, Default)]
pub struct InMemoryOrderTracker {
    orders: RwLock<HashMap<String, TrackedOrder>>,
}

impl InMemoryOrderTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure reason recorded for an order, if it failed.
    #[must_use]
    pub fn failure_of(&self, client_order_id: &str) -> Option<String> {
        self.orders
            .read()
            .get(client_order_id)
            .and_then(|t| t.failure.clone())
    }

    /// All orders with a recorded failure, as (client order id, reason).
    #[must_use]
    pub fn failed_orders(&self) -> Vec<(String, String)> {
        self.orders
            .read()
            .iter()
            .filter_map(|(id, t)| t.failure.clone().map(|reason| (id.clone(), reason)))
            .collect()
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether no orders are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderTracker for InMemoryOrderTracker {
    async fn start_tracking(&self, order: &Order) {
        self.orders.write().insert(
            order.client_order_id.clone(),
            TrackedOrder {
                order: order.clone(),
                failure: None,
            },
        );
    }

    async fn update_order(&self, order: &Order) {
        let mut orders = self.orders.write();
        match orders.get_mut(&order.client_order_id) {
            Some(tracked) => tracked.order = order.clone(),
            None => {
                orders.insert(
                    order.client_order_id.clone(),
                    TrackedOrder {
                        order: order.clone(),
                        failure: None,
                    },
                );
            }
        }
    }

    async fn mark_order_failed(&self, client_order_id: &str, reason: &str) {
        if let Some(tracked) = self.orders.write().get_mut(client_order_id) {
            tracked.failure = Some(reason.to_string());
        }
    }

    async fn find(&self, client_order_id: &str) -> Option<Order> {
        self.orders
            .read()
            .get(client_order_id)
            .map(|t| t.order.clone())
    }
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Domain events emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    /// Order accepted by the endpoint.
    Submitted {
        /// The acknowledged order.
        order: Order,
    },
    /// Order cancelled.
    Cancelled {
        /// The cancelled order's client id.
        client_order_id: String,
        /// Endpoint order id, when known.
        broker_order_id: Option<String>,
    },
    /// Order modified.
    Modified {
        /// The modified order's endpoint id.
        broker_order_id: String,
    },
    /// Order rejected before or at the endpoint.
    Rejected {
        /// The rejected order's client id.
        client_order_id: String,
        /// Rejection reason.
        reason: String,
    },
    /// A position changed as a consequence of a fill.
    PositionDelta {
        /// Owning user.
        user_id: String,
        /// Instrument symbol.
        symbol: String,
        /// Signed quantity change.
        quantity_delta: Decimal,
    },
}

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Publishing failed downstream.
    #[error("event publish failed: {message}")]
    Failed {
        /// Error details.
        message: String,
    },
}

/// Port for the fire-and-forget event publisher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event. Callers treat failures as non-fatal.
    async fn publish(&self, event: OrderEvent) -> Result<(), PublishError>;
}

/// No-op event publisher for tests and headless wiring.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: OrderEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderSide, OrderStatus, OrderType, TimeInForce};
    use chrono::Utc;

    fn sample_order(id: &str) -> Order {
        let now = Utc::now();
        Order {
            client_order_id: id.to_string(),
            broker_order_id: None,
            user_id: "user-1".to_string(),
            symbol: "AKBNK".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: Decimal::new(100, 0),
            price: Some(Decimal::new(1725, 2)),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            status: OrderStatus::New,
            filled_quantity: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn tracker_start_and_find() {
        let tracker = InMemoryOrderTracker::new();
        let order = sample_order("ord-1");

        tracker.start_tracking(&order).await;
        let found = tracker.find("ord-1").await.unwrap();
        assert_eq!(found.client_order_id, "ord-1");
        assert!(tracker.failure_of("ord-1").is_none());
    }

    #[tokio::test]
    async fn tracker_records_failure() {
        let tracker = InMemoryOrderTracker::new();
        let order = sample_order("ord-2");

        tracker.start_tracking(&order).await;
        tracker
            .mark_order_failed("ord-2", "rate limit exceeded")
            .await;

        assert_eq!(
            tracker.failure_of("ord-2").as_deref(),
            Some("rate limit exceeded")
        );
    }

    #[tokio::test]
    async fn tracker_update_replaces_state() {
        let tracker = InMemoryOrderTracker::new();
        let mut order = sample_order("ord-3");
        tracker.start_tracking(&order).await;

        order.acknowledge("BRK-42", Utc::now());
        tracker.update_order(&order).await;

        let found = tracker.find("ord-3").await.unwrap();
        assert_eq!(found.broker_order_id.as_deref(), Some("BRK-42"));
    }

    #[tokio::test]
    async fn tracker_update_inserts_unknown_order() {
        let tracker = InMemoryOrderTracker::new();
        let order = sample_order("ord-4");
        tracker.update_order(&order).await;
        assert!(tracker.find("ord-4").await.is_some());
    }

    #[tokio::test]
    async fn no_op_publisher_succeeds() {
        let publisher = NoOpEventPublisher;
        let result = publisher
            .publish(OrderEvent::Rejected {
                client_order_id: "ord-1".to_string(),
                reason: "risk".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn risk_decision_constructors() {
        assert!(RiskDecision::approved().approved);
        let rejected = RiskDecision::rejected("position limit");
        assert!(!rejected.approved);
        assert_eq!(rejected.reason.as_deref(), Some("position limit"));
    }

    #[test]
    fn order_event_serializes_with_tag() {
        let event = OrderEvent::Cancelled {
            client_order_id: "ord-9".to_string(),
            broker_order_id: Some("BRK-9".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"cancelled\""));
    }
}
