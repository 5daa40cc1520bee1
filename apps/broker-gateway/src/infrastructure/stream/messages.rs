//! Streaming Wire Messages
//!
//! The endpoint frames every streaming message in a JSON envelope:
//!
//! ```json
//! {"type": "...", "channel": "...", "data": {...}, "timestamp": "..."}
//! ```
//!
//! Inbound messages decode into a closed tagged union with an explicit
//! `Unknown` variant — an unrecognized type is logged and dropped by the
//! dispatcher, never fatal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderStatus;
use crate::domain::subscription::StreamChannel;

// =============================================================================
// Envelope
// =============================================================================

/// Raw message envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Channel or topic, when the message is channel-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Message payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    /// Server or client timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Error message, on failure types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wire tags of the message types this client understands.
#[allow(missing_docs)]
pub mod message_type {
    pub const AUTH: &str = "auth";
    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const AUTH_FAILURE: &str = "auth_failure";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const TICK: &str = "tick";
    pub const ORDER_BOOK: &str = "orderbook";
    pub const TRADE: &str = "trade";
    pub const ORDER_UPDATE: &str = "order_update";
    pub const PORTFOLIO_UPDATE: &str = "portfolio_update";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

// =============================================================================
// Data Payloads
// =============================================================================

/// Per-symbol price tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    /// Instrument symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_price: Decimal,
    /// Best bid.
    #[serde(default)]
    pub bid: Option<Decimal>,
    /// Best ask.
    #[serde(default)]
    pub ask: Option<Decimal>,
    /// Session volume.
    #[serde(default)]
    pub volume: Option<Decimal>,
}

/// One side level of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting quantity at the level.
    pub quantity: Decimal,
}

/// Order book depth update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookData {
    /// Instrument symbol.
    pub symbol: String,
    /// Bid levels, best first.
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// Executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeData {
    /// Instrument symbol.
    pub symbol: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
}

/// Push update for one of the user's own orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdateData {
    /// Endpoint-assigned order identifier.
    pub order_id: String,
    /// Client order identifier, when the endpoint echoes it.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Reported status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub filled_quantity: Decimal,
}

/// Portfolio/position delta push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioUpdateData {
    /// Instrument symbol.
    pub symbol: String,
    /// Position quantity after the change.
    pub quantity: Decimal,
    /// Average entry price, when reported.
    #[serde(default)]
    pub average_price: Option<Decimal>,
}

// =============================================================================
// Inbound Union
// =============================================================================

/// Every inbound message the dispatcher can act on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Endpoint accepted the streaming credential.
    AuthSuccess,
    /// Endpoint rejected the streaming credential.
    AuthFailure {
        /// Rejection reason.
        reason: String,
    },
    /// Subscription acknowledgment echoed by the endpoint.
    SubscriptionAck {
        /// Acknowledged channel, when recognizable.
        channel: Option<StreamChannel>,
        /// Acknowledged key.
        key: Option<String>,
    },
    /// Market tick.
    Tick(TickData),
    /// Order book depth.
    OrderBook(OrderBookData),
    /// Executed trade.
    Trade(TradeData),
    /// Own-order lifecycle update.
    OrderUpdate(OrderUpdateData),
    /// Portfolio delta.
    PortfolioUpdate(PortfolioUpdateData),
    /// Server liveness probe.
    Ping,
    /// Reply to our ping.
    Pong,
    /// Server-reported error.
    Error {
        /// Error message.
        message: String,
    },
    /// A type this client does not recognize. Logged and dropped.
    Unknown {
        /// The unrecognized type tag.
        message_type: String,
    },
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// Messages this client sends to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Authentication handshake, sent immediately after connecting.
    Auth {
        /// Session token.
        token: String,
        /// Authorization hash.
        hash: String,
    },
    /// Subscribe to a channel/key.
    Subscribe {
        /// Channel to subscribe.
        channel: StreamChannel,
        /// Symbol or user identifier.
        key: String,
    },
    /// Unsubscribe from a channel/key.
    Unsubscribe {
        /// Channel to unsubscribe.
        channel: StreamChannel,
        /// Symbol or user identifier.
        key: String,
    },
    /// Heartbeat ping.
    Ping,
}

impl OutboundMessage {
    /// Build the wire envelope for this message.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        let (message_type, channel, data) = match self {
            Self::Auth { token, hash } => (
                message_type::AUTH,
                None,
                serde_json::json!({ "token": token, "hash": hash }),
            ),
            Self::Subscribe { channel, key } => (
                message_type::SUBSCRIBE,
                Some(channel.as_str().to_string()),
                serde_json::json!({ "key": key }),
            ),
            Self::Unsubscribe { channel, key } => (
                message_type::UNSUBSCRIBE,
                Some(channel.as_str().to_string()),
                serde_json::json!({ "key": key }),
            ),
            Self::Ping => (message_type::PING, None, serde_json::Value::Null),
        };
        Envelope {
            message_type: message_type.to_string(),
            channel,
            data,
            timestamp: Some(Utc::now()),
            error: None,
        }
    }
}

/// Parse a wire channel name back into the closed channel enum.
#[must_use]
pub fn parse_channel(name: &str) -> Option<StreamChannel> {
    match name {
        "tick" => Some(StreamChannel::MarketTick),
        "orderbook" | "depth" => Some(StreamChannel::OrderBook),
        "trade" => Some(StreamChannel::Trade),
        "order_update" => Some(StreamChannel::OrderUpdate),
        "portfolio_update" => Some(StreamChannel::PortfolioUpdate),
        _ => None,
    }
}
