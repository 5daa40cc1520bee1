//! Streaming Adapter
//!
//! WebSocket client for the brokerage's real-time channel: connection
//! lifecycle, authentication handshake, subscription resynchronization,
//! reconnection with linear backoff, and inbound dispatch.

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;

pub use client::{ConnectionState, StreamClient, StreamCredential, StreamError, StreamEvent};
pub use codec::{CodecError, JsonCodec};
pub use messages::{InboundMessage, OutboundMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
