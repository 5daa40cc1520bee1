//! Order Aggregate and Lifecycle
//!
//! Orders are created when the pipeline accepts a validated request and are
//! mutated only by endpoint-originated status updates — pushed over the
//! streaming connection or returned synchronously from submit/cancel/modify
//! calls. Terminal orders are immutable; orders are superseded, never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Value Objects
// =============================================================================

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at the best available price.
    Market,
    /// Execute at the limit price or better.
    Limit,
    /// Becomes a market order once the stop price is touched.
    Stop,
    /// Becomes a limit order once the stop price is touched.
    StopLimit,
    /// Only the visible quantity is shown to the book at a time.
    Iceberg,
    /// Execute the full quantity or nothing.
    AllOrNone,
    /// Execute the full quantity immediately or cancel.
    FillOrKill,
    /// Execute what is immediately available, cancel the rest.
    ImmediateOrCancel,
}

impl OrderType {
    /// Whether this type requires a limit price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        !matches!(self, Self::Market | Self::Stop)
    }

    /// Whether this type requires a stop price.
    #[must_use]
    pub const fn requires_stop_price(&self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }
}

/// How long an order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the trading day.
    #[default]
    Day,
    /// Valid until explicitly cancelled.
    GoodTillCancelled,
    /// Valid until a caller-supplied expiration.
    GoodTillDate,
    /// Immediate-or-cancel.
    ImmediateOrCancel,
    /// Fill-or-kill.
    FillOrKill,
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order.
///
/// The status set is closed; `FILLED`, `CANCELLED`, `REJECTED` and `EXPIRED`
/// are terminal and immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted locally, awaiting endpoint updates.
    New,
    /// Some quantity executed, remainder still working.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the endpoint.
    Rejected,
    /// Expired per its time in force.
    Expired,
}

impl OrderStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Whether the order is still working at the endpoint.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// Validates order status transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a status transition is valid.
    ///
    /// `PARTIALLY_FILLED → PARTIALLY_FILLED` is permitted so that repeated
    /// partial-fill updates can be absorbed without a status change.
    #[must_use]
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::New, OrderStatus::PartiallyFilled)
                | (OrderStatus::New, OrderStatus::Filled)
                | (OrderStatus::New, OrderStatus::Cancelled)
                | (OrderStatus::New, OrderStatus::Rejected)
                | (OrderStatus::New, OrderStatus::Expired)
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
        )
    }

    /// Validate a transition, naming the violated rule on failure.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else if from.is_terminal() {
            Err(OrderError::TerminalStatus { status: from })
        } else {
            Err(OrderError::InvalidTransition { from, to })
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by order lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order is in a terminal status and cannot change.
    #[error("order is {status} and can no longer change")]
    TerminalStatus {
        /// The terminal status the order is in.
        status: OrderStatus,
    },

    /// The requested status transition is not in the transition table.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },

    /// Filled quantity update went backwards or past the order quantity.
    #[error("filled quantity {filled} is invalid for order quantity {quantity}")]
    InvalidFilledQuantity {
        /// Reported cumulative filled quantity.
        filled: Decimal,
        /// Total order quantity.
        quantity: Decimal,
    },
}

// =============================================================================
// Order
// =============================================================================

/// An order accepted by the pipeline and tracked against the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client-generated identifier, globally unique per user + time + suffix.
    pub client_order_id: String,
    /// Endpoint-assigned identifier, absent until acknowledged.
    pub broker_order_id: Option<String>,
    /// Owning platform user.
    pub user_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution type.
    pub order_type: OrderType,
    /// Total quantity.
    pub quantity: Decimal,
    /// Limit price, absent for market orders.
    pub price: Option<Decimal>,
    /// Stop trigger price, absent unless a stop type.
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Creation time (pipeline acceptance).
    pub created_at: DateTime<Utc>,
    /// Time of the last endpoint-originated update.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Apply an endpoint-originated status update.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is terminal or the transition is not in
    /// the transition table. The order is left unchanged on error.
    pub fn apply_status(&mut self, status: OrderStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if status == self.status && !status.is_terminal() {
            self.updated_at = at;
            return Ok(());
        }
        OrderStateMachine::validate_transition(self.status, status)?;
        self.status = status;
        self.updated_at = at;
        Ok(())
    }

    /// Record an endpoint-reported cumulative fill.
    ///
    /// # Errors
    ///
    /// Returns an error if the fill regresses or exceeds the order quantity.
    pub fn apply_fill(&mut self, filled: Decimal, at: DateTime<Utc>) -> Result<(), OrderError> {
        if filled < self.filled_quantity || filled > self.quantity {
            return Err(OrderError::InvalidFilledQuantity {
                filled,
                quantity: self.quantity,
            });
        }
        let status = if filled == self.quantity {
            OrderStatus::Filled
        } else if filled > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            self.status
        };
        self.apply_status(status, at)?;
        self.filled_quantity = filled;
        Ok(())
    }

    /// Record the endpoint acknowledgment for this order.
    pub fn acknowledge(&mut self, broker_order_id: impl Into<String>, at: DateTime<Utc>) {
        self.broker_order_id = Some(broker_order_id.into());
        self.updated_at = at;
    }

    /// Remaining unfilled quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }
}
