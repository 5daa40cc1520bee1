//! Brokerage REST API request and response types.
//!
//! These types map directly to the endpoint's JSON bodies. Credential values
//! inside requests are already encrypted by the caller; nothing in this
//! module touches the cipher.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;

// ============================================================================
// Authentication Types
// ============================================================================

/// Login request body. The password is cipher-encrypted before it gets here.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Platform username.
    pub username: String,
    /// Cipher-encrypted password.
    pub password: String,
}

/// Session refresh request body.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    /// The current session token being refreshed.
    pub refresh_token: String,
}

/// Authentication response, shared by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Short-lived session token.
    pub token: String,
    /// Authorization hash for the streaming handshake.
    #[serde(default)]
    pub hash: Option<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Order Types
// ============================================================================

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSubmitPayload {
    /// Instrument symbol.
    pub symbol: String,
    /// BUY or SELL.
    pub side: String,
    /// Order type tag.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Quantity, serialized as a decimal string.
    pub quantity: Decimal,
    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Stop trigger price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Time in force tag.
    pub time_in_force: String,
    /// Client-generated order identifier.
    pub client_order_id: String,
    /// Expiration for GOOD_TILL_DATE orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub good_till_date: Option<DateTime<Utc>>,
    /// Visible quantity for iceberg orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iceberg_quantity: Option<Decimal>,
}

/// Order modification request body. Absent fields are left unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct OrderModifyPayload {
    /// Endpoint-assigned order identifier.
    pub order_id: String,
    /// New quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    /// New limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// New stop price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// New expiration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub good_till_date: Option<DateTime<Utc>>,
}

/// Order cancellation request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelPayload {
    /// Endpoint-assigned order identifier.
    pub order_id: String,
}

/// Order acknowledgment returned by submit/modify/cancel and order queries.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    /// Endpoint-assigned order identifier.
    pub order_id: String,
    /// Client order identifier echoed back, when known to the endpoint.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Reported order status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub filled_quantity: Decimal,
    /// Endpoint message, populated on rejections.
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Error Body
// ============================================================================

/// Error body shape returned by the endpoint on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerErrorBody {
    /// Endpoint error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_payload_omits_absent_fields() {
        let payload = OrderSubmitPayload {
            symbol: "AKBNK".to_string(),
            side: "BUY".to_string(),
            order_type: "MARKET".to_string(),
            quantity: Decimal::new(100, 0),
            price: None,
            stop_price: None,
            time_in_force: "DAY".to_string(),
            client_order_id: "user-1-1700000000000-a1b2c3d4".to_string(),
            good_till_date: None,
            iceberg_quantity: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("price"));
        assert!(!json.contains("iceberg_quantity"));
        assert!(json.contains("\"type\":\"MARKET\""));
    }

    #[test]
    fn auth_response_parses_without_hash() {
        let json = r#"{"token":"tok","expires_at":"2026-01-01T00:00:00Z"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.token, "tok");
        assert!(resp.hash.is_none());
    }

    #[test]
    fn order_ack_parses_minimal_body() {
        let json = r#"{"order_id":"BRK-1","status":"NEW"}"#;
        let ack: OrderAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.order_id, "BRK-1");
        assert_eq!(ack.status, OrderStatus::New);
        assert_eq!(ack.filled_quantity, Decimal::ZERO);
        assert!(ack.client_order_id.is_none());
    }

    #[test]
    fn error_body_tolerates_unknown_shape() {
        let body: BrokerErrorBody = serde_json::from_str("{}").unwrap();
        assert!(body.code.is_none());
        assert!(body.message.is_none());
    }
}
