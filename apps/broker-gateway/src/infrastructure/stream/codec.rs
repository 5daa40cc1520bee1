//! Streaming JSON Codec
//!
//! Decodes wire envelopes into the closed [`InboundMessage`] union and
//! encodes [`OutboundMessage`]s. Message types this client does not know
//! decode to `InboundMessage::Unknown` rather than failing.

use thiserror::Error;

use super::messages::{
    Envelope, InboundMessage, OutboundMessage, message_type, parse_channel,
};

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not a valid envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    /// A known message type carried a payload that does not parse.
    #[error("malformed {message_type} payload: {reason}")]
    MalformedPayload {
        /// The message type whose payload failed to parse.
        message_type: String,
        /// Parse failure details.
        reason: String,
    },
}

/// JSON codec for the streaming envelope protocol.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into an inbound message.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let message_type = envelope.message_type.as_str();

        let message = match message_type {
            message_type::AUTH_SUCCESS => InboundMessage::AuthSuccess,
            message_type::AUTH_FAILURE => InboundMessage::AuthFailure {
                reason: envelope
                    .error
                    .unwrap_or_else(|| "authentication rejected".to_string()),
            },
            message_type::SUBSCRIBE | message_type::UNSUBSCRIBE => {
                InboundMessage::SubscriptionAck {
                    channel: envelope.channel.as_deref().and_then(parse_channel),
                    key: envelope.data.get("key").and_then(|k| k.as_str()).map(String::from),
                }
            }
            message_type::TICK => InboundMessage::Tick(parse_payload(&envelope)?),
            message_type::ORDER_BOOK => InboundMessage::OrderBook(parse_payload(&envelope)?),
            message_type::TRADE => InboundMessage::Trade(parse_payload(&envelope)?),
            message_type::ORDER_UPDATE => InboundMessage::OrderUpdate(parse_payload(&envelope)?),
            message_type::PORTFOLIO_UPDATE => {
                InboundMessage::PortfolioUpdate(parse_payload(&envelope)?)
            }
            message_type::PING => InboundMessage::Ping,
            message_type::PONG => InboundMessage::Pong,
            message_type::ERROR => InboundMessage::Error {
                message: envelope
                    .error
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            },
            other => InboundMessage::Unknown {
                message_type: other.to_string(),
            },
        };

        Ok(message)
    }

    /// Encode an outbound message to a text frame.
    pub fn encode(&self, message: &OutboundMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&message.to_envelope())?)
    }
}

/// Parse the `data` field of a known message type.
fn parse_payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, CodecError> {
    serde_json::from_value(envelope.data.clone()).map_err(|err| CodecError::MalformedPayload {
        message_type: envelope.message_type.clone(),
        reason: err.to_string(),
    })
}
