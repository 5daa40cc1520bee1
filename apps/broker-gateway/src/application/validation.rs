//! Order Validation
//!
//! Pure, side-effect-free rule checks on order requests before anything is
//! sent to the endpoint. All rules are evaluated independently — errors
//! accumulate, validation never short-circuits on the first failure.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderSide, OrderType, TimeInForce};
use crate::infrastructure::config::ValidationLimits;

static SYMBOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Z]{2,6}$").expect("static symbol pattern is valid")
});

static USER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z0-9-_]{3,50}$").expect("static user id pattern is valid")
});

static ACCOUNT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Z0-9]{8,20}$").expect("static account id pattern is valid")
});

/// Minimum lead time for a GOOD_TILL_DATE expiration.
fn min_gtd_lead() -> Duration {
    Duration::minutes(5)
}

// =============================================================================
// Requests
// =============================================================================

/// An order submission request as received from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Platform user submitting the order.
    pub user_id: String,
    /// Brokerage account the order executes against.
    pub account_id: String,
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
    /// Stop trigger price.
    pub stop_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Expiration for GOOD_TILL_DATE orders.
    pub good_till_date: Option<DateTime<Utc>>,
    /// Visible quantity for iceberg orders.
    pub iceberg_quantity: Option<Decimal>,
}

impl OrderRequest {
    /// Notional value (price × quantity), when computable.
    #[must_use]
    pub fn notional_value(&self) -> Option<Decimal> {
        self.price.map(|p| p * self.quantity)
    }
}

/// An order modification request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyRequest {
    /// New total quantity.
    pub new_quantity: Option<Decimal>,
    /// New limit price.
    pub new_price: Option<Decimal>,
    /// New stop price.
    pub new_stop_price: Option<Decimal>,
    /// New expiration.
    pub new_good_till_date: Option<DateTime<Utc>>,
}

impl ModifyRequest {
    /// Whether the request carries at least one mutable field.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.new_quantity.is_some()
            || self.new_price.is_some()
            || self.new_stop_price.is_some()
            || self.new_good_till_date.is_some()
    }
}

// =============================================================================
// Result
// =============================================================================

/// Outcome of a validation pass. Transient, produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether every rule passed.
    pub valid: bool,
    /// Failed rules, in evaluation order.
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// All error messages joined for reporting.
    #[must_use]
    pub fn joined(&self) -> String {
        self.errors.join("; ")
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Validate an order submission request.
///
/// `now` is passed in so the GOOD_TILL_DATE rule stays deterministic.
#[must_use]
pub fn validate_submission(
    request: &OrderRequest,
    limits: &ValidationLimits,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut errors = Vec::new();

    if !USER_ID_PATTERN.is_match(&request.user_id) {
        errors.push("Invalid user ID format".to_string());
    }

    if !ACCOUNT_ID_PATTERN.is_match(&request.account_id) {
        errors.push("Invalid account ID format".to_string());
    }

    if !SYMBOL_PATTERN.is_match(&request.symbol) {
        errors.push("Invalid symbol format. Must be 2-6 uppercase letters".to_string());
    }

    if request.quantity <= Decimal::ZERO {
        errors.push("Quantity must be positive".to_string());
    }

    if request.quantity > limits.max_quantity {
        errors.push(format!(
            "Quantity exceeds maximum allowed: {}",
            limits.max_quantity
        ));
    }

    if request.order_type.requires_price() && request.price.is_none() {
        errors.push(format!("{:?} orders require a price", request.order_type));
    }

    if request.order_type.requires_stop_price() && request.stop_price.is_none() {
        errors.push(format!(
            "{:?} orders require a stop price",
            request.order_type
        ));
    }

    if let Some(price) = request.price {
        if price < limits.min_price {
            errors.push(format!("Price below minimum: {}", limits.min_price));
        }
        if price > limits.max_price {
            errors.push(format!("Price exceeds maximum: {}", limits.max_price));
        }
    }

    if let Some(stop) = request.stop_price {
        if stop < limits.min_price {
            errors.push(format!("Stop price below minimum: {}", limits.min_price));
        }
        if stop > limits.max_price {
            errors.push(format!("Stop price exceeds maximum: {}", limits.max_price));
        }
    }

    if let Some(value) = request.notional_value() {
        if value < limits.min_order_value {
            errors.push(format!(
                "Order value below minimum: {}",
                limits.min_order_value
            ));
        }
        if value > limits.max_order_value {
            errors.push(format!(
                "Order value exceeds maximum: {}",
                limits.max_order_value
            ));
        }
    }

    if request.order_type == OrderType::StopLimit {
        validate_stop_limit(request, &mut errors);
    }

    if request.time_in_force == TimeInForce::GoodTillDate && request.good_till_date.is_none() {
        errors.push("Good till date orders require an expiration".to_string());
    }

    if let Some(gtd) = request.good_till_date
        && gtd < now + min_gtd_lead()
    {
        errors.push("Good till date must be at least 5 minutes in the future".to_string());
    }

    if let Some(iceberg) = request.iceberg_quantity {
        if iceberg <= Decimal::ZERO {
            errors.push("Iceberg quantity must be positive".to_string());
        } else if iceberg >= request.quantity {
            errors.push("Iceberg quantity must be less than total quantity".to_string());
        }
    }

    ValidationResult::from_errors(errors)
}

/// STOP_LIMIT trigger rules: a buy stop must trigger above the limit price, a
/// sell stop below it.
fn validate_stop_limit(request: &OrderRequest, errors: &mut Vec<String>) {
    let (Some(price), Some(stop)) = (request.price, request.stop_price) else {
        // Presence rules report the missing field.
        return;
    };

    match request.side {
        OrderSide::Buy => {
            if stop <= price {
                errors
                    .push("For buy stop orders, stop price must be above limit price".to_string());
            }
        }
        OrderSide::Sell => {
            if stop >= price {
                errors
                    .push("For sell stop orders, stop price must be below limit price".to_string());
            }
        }
    }
}

/// Validate an order cancellation request.
#[must_use]
pub fn validate_cancellation(order_id: &str, user_id: &str) -> ValidationResult {
    let mut errors = Vec::new();

    if order_id.trim().is_empty() {
        errors.push("Order ID is required for cancellation".to_string());
    }

    if user_id.trim().is_empty() {
        errors.push("User ID is required for cancellation".to_string());
    } else if !USER_ID_PATTERN.is_match(user_id) {
        errors.push("Invalid user ID format".to_string());
    }

    ValidationResult::from_errors(errors)
}

/// Validate an order modification request against the tracked order state.
///
/// `filled_quantity` is the already-filled quantity of the order being
/// modified; the new quantity may not go below it.
#[must_use]
pub fn validate_modification(
    order_id: &str,
    request: &ModifyRequest,
    filled_quantity: Decimal,
    limits: &ValidationLimits,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut errors = Vec::new();

    if order_id.trim().is_empty() {
        errors.push("Order ID is required for modification".to_string());
    }

    if !request.has_changes() {
        errors.push("Modification requires at least one field to change".to_string());
    }

    if let Some(quantity) = request.new_quantity {
        if quantity < filled_quantity {
            errors.push(format!(
                "New quantity cannot be below already-filled quantity: {filled_quantity}"
            ));
        }
        if quantity > limits.max_quantity {
            errors.push(format!(
                "New quantity exceeds maximum allowed: {}",
                limits.max_quantity
            ));
        }
    }

    if let Some(price) = request.new_price {
        if price < limits.min_price {
            errors.push(format!("New price below minimum: {}", limits.min_price));
        }
        if price > limits.max_price {
            errors.push(format!("New price exceeds maximum: {}", limits.max_price));
        }
    }

    if let Some(stop) = request.new_stop_price {
        if stop < limits.min_price {
            errors.push(format!("New stop price below minimum: {}", limits.min_price));
        }
        if stop > limits.max_price {
            errors.push(format!(
                "New stop price exceeds maximum: {}",
                limits.max_price
            ));
        }
    }

    if let Some(gtd) = request.new_good_till_date
        && gtd < now + min_gtd_lead()
    {
        errors.push("New good till date must be at least 5 minutes in the future".to_string());
    }

    ValidationResult::from_errors(errors)
}
