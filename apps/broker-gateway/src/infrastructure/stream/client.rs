//! Streaming Client
//!
//! Persistent WebSocket connection to the brokerage's real-time channel.
//! Owns the subscription set, reconnection, and inbound message dispatch.
//!
//! # State machine
//!
//! ```text
//! DISCONNECTED → CONNECTING → CONNECTED
//!                     ↑            │ close/error
//!                     │            ▼
//!                     └─────  RECONNECTING ──► DISCONNECTED (attempts exhausted)
//! ```
//!
//! On every (re)connect the client sends the authentication message first and
//! waits for the explicit acknowledgment; an authentication failure from the
//! endpoint disconnects immediately with no reconnect attempt — the
//! credential itself is bad. After the acknowledgment, the full live
//! subscription set is replayed BEFORE the caller-visible connected signal,
//! so no inbound message can be attributed to a stale subscription state.
//!
//! Reconnection is driven by transport-level close/error only; a missed pong
//! is logged but does not itself force a reconnect.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::messages::{InboundMessage, OutboundMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::subscription::{StreamChannel, SubscriptionSet};
use crate::infrastructure::config::StreamSettings;

// =============================================================================
// Errors and Events
// =============================================================================

/// Errors from the streaming client.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// WebSocket connection failed.
    #[error("stream connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The endpoint rejected the streaming credential. Terminal.
    #[error("stream authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// The endpoint did not acknowledge authentication in time.
    #[error("stream authentication timed out")]
    AuthenticationTimeout,

    /// Codec failure on a known message type.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Reconnection attempts exhausted. Terminal.
    #[error("maximum reconnection attempts exceeded")]
    ReconnectExhausted,

    /// Connection closed by the endpoint.
    #[error("stream connection closed")]
    ConnectionClosed,
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    #[default]
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Authenticated and delivering subscriptions.
    Connected,
    /// Lost the connection, retrying with backoff.
    Reconnecting,
}

/// Events emitted to the consumer of the stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Authenticated, resynchronized, and delivering.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Reconnect attempt scheduled.
    Reconnecting {
        /// Attempt number.
        attempt: u32,
    },
    /// Market tick.
    Tick(super::messages::TickData),
    /// Order book depth update.
    OrderBook(super::messages::OrderBookData),
    /// Executed trade.
    Trade(super::messages::TradeData),
    /// Own-order lifecycle update.
    OrderUpdate(super::messages::OrderUpdateData),
    /// Portfolio delta.
    PortfolioUpdate(super::messages::PortfolioUpdateData),
    /// Server-reported error.
    Error(String),
}

/// Credential pair used on the streaming handshake.
#[derive(Clone)]
pub struct StreamCredential {
    /// Session token.
    pub token: String,
    /// Authorization hash.
    pub hash: String,
}

impl std::fmt::Debug for StreamCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCredential")
            .field("token", &"[REDACTED]")
            .field("hash", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Streaming client over the brokerage's persistent channel.
pub struct StreamClient {
    settings: StreamSettings,
    codec: JsonCodec,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    state: parking_lot::RwLock<ConnectionState>,
    subscriptions: parking_lot::RwLock<SubscriptionSet>,
    command_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<OutboundMessage>>>,
}

impl StreamClient {
    /// Create a new streaming client.
    #[must_use]
    pub fn new(
        settings: StreamSettings,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            codec: JsonCodec::new(),
            event_tx,
            cancel,
            state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            subscriptions: parking_lot::RwLock::new(SubscriptionSet::new()),
            command_tx: parking_lot::Mutex::new(None),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the client is connected and delivering.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the live subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionSet {
        self.subscriptions.read().clone()
    }

    /// Subscribe to a channel/key.
    ///
    /// The subscription joins the live set immediately (and will be replayed
    /// on every reconnect); when connected, the wire message is also sent
    /// right away.
    pub fn subscribe(&self, channel: StreamChannel, key: impl Into<String>) {
        let key = key.into();
        let inserted = self.subscriptions.write().insert(channel, key.clone());
        if !inserted {
            return;
        }
        self.send_command(OutboundMessage::Subscribe { channel, key });
    }

    /// Unsubscribe from a channel/key.
    pub fn unsubscribe(&self, channel: StreamChannel, key: &str) {
        let removed = self.subscriptions.write().remove(channel, key);
        if !removed {
            return;
        }
        self.send_command(OutboundMessage::Unsubscribe {
            channel,
            key: key.to_string(),
        });
    }

    /// Disconnect gracefully. No reconnect is attempted.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Run the connection loop until cancelled or terminally failed.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationRejected` when the endpoint refuses the
    /// credential (no reconnect), or `ReconnectExhausted` once the attempt
    /// cap is exceeded.
    pub async fn run(self: Arc<Self>, credential: StreamCredential) -> Result<(), StreamError> {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            base_delay: self.settings.reconnect_base_delay,
            max_attempts: self.settings.max_reconnect_attempts,
        });
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.cancel.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            let result = self.connect_and_run(&credential, &mut policy).await;
            *self.command_tx.lock() = None;

            match result {
                Ok(()) => {
                    tracing::info!("Stream closed gracefully");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(err @ StreamError::AuthenticationRejected(_)) => {
                    // The credential itself is bad; retrying cannot help.
                    tracing::error!(error = %err, "Stream authentication rejected");
                    self.set_state(ConnectionState::Disconnected);
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Stream connection error");
                    let _ = self.event_tx.send(StreamEvent::Disconnected).await;

                    if let Some(delay) = policy.next_delay() {
                        let attempt = policy.attempt_count();
                        self.set_state(ConnectionState::Reconnecting);
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to stream"
                        );
                        let _ = self.event_tx.send(StreamEvent::Reconnecting { attempt }).await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                self.set_state(ConnectionState::Disconnected);
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(StreamError::ReconnectExhausted);
                    }
                }
            }
        }
    }

    /// Connect, authenticate, resynchronize, then service the connection.
    async fn connect_and_run(
        &self,
        credential: &StreamCredential,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamError> {
        tracing::info!(url = %self.settings.url, "Connecting to stream");
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async(&self.settings.url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Authenticate first; nothing is deliverable until the ack.
        let auth = OutboundMessage::Auth {
            token: credential.token.clone(),
            hash: credential.hash.clone(),
        };
        write.send(Message::Text(self.codec.encode(&auth)?.into())).await?;
        self.await_auth_ack(&mut read).await?;

        // Resynchronization invariant: replay the full live set before any
        // caller-visible connected signal.
        let snapshot = self.subscriptions.read().snapshot();
        for sub in &snapshot {
            let msg = OutboundMessage::Subscribe {
                channel: sub.channel,
                key: sub.key.clone(),
            };
            write.send(Message::Text(self.codec.encode(&msg)?.into())).await?;
        }
        if !snapshot.is_empty() {
            tracing::info!(count = snapshot.len(), "Subscriptions resynchronized");
        }

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);
        policy.reset();
        self.set_state(ConnectionState::Connected);
        let _ = self.event_tx.send(StreamEvent::Connected).await;

        let mut ping_interval = tokio::time::interval(self.settings.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping_interval.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping_interval.tick() => {
                    write
                        .send(Message::Text(self.codec.encode(&OutboundMessage::Ping)?.into()))
                        .await?;
                }
                command = command_rx.recv() => {
                    if let Some(message) = command {
                        write
                            .send(Message::Text(self.codec.encode(&message)?.into()))
                            .await?;
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_inbound(&text).await? {
                                write.send(Message::Text(self.codec.encode(&reply)?.into())).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            tracing::trace!("Transport pong received");
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Endpoint sent close frame");
                            return Err(StreamError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary and frame messages are not part of the protocol.
                        }
                        Some(Err(err)) => return Err(err.into()),
                        None => return Err(StreamError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Wait for the authentication acknowledgment, bounded by the configured
    /// timeout.
    async fn await_auth_ack<S>(&self, read: &mut S) -> Result<(), StreamError>
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let wait = async {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match self.codec.decode(&text)? {
                        InboundMessage::AuthSuccess => {
                            tracing::info!("Stream authenticated");
                            return Ok(());
                        }
                        InboundMessage::AuthFailure { reason } => {
                            return Err(StreamError::AuthenticationRejected(reason));
                        }
                        other => {
                            tracing::debug!(message = ?other, "Ignoring pre-auth message");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(StreamError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        };

        tokio::time::timeout(self.settings.auth_timeout, wait)
            .await
            .map_err(|_| StreamError::AuthenticationTimeout)?
    }

    /// Dispatch one inbound text frame. Returns a reply to send, if any.
    async fn handle_inbound(&self, text: &str) -> Result<Option<OutboundMessage>, StreamError> {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(err @ CodecError::MalformedPayload { .. }) => {
                // A known type with a bad payload is logged and dropped, the
                // connection stays up.
                tracing::warn!(error = %err, "Dropping malformed payload");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        match message {
            InboundMessage::Tick(data) => {
                let _ = self.event_tx.send(StreamEvent::Tick(data)).await;
            }
            InboundMessage::OrderBook(data) => {
                let _ = self.event_tx.send(StreamEvent::OrderBook(data)).await;
            }
            InboundMessage::Trade(data) => {
                let _ = self.event_tx.send(StreamEvent::Trade(data)).await;
            }
            InboundMessage::OrderUpdate(data) => {
                let _ = self.event_tx.send(StreamEvent::OrderUpdate(data)).await;
            }
            InboundMessage::PortfolioUpdate(data) => {
                let _ = self.event_tx.send(StreamEvent::PortfolioUpdate(data)).await;
            }
            InboundMessage::SubscriptionAck { channel, key } => {
                if let (Some(channel), Some(key)) = (channel, key) {
                    self.subscriptions
                        .write()
                        .confirm(channel, &key, chrono::Utc::now());
                }
            }
            InboundMessage::Ping => return Ok(Some(OutboundMessage::Ping)),
            InboundMessage::Pong => {
                tracing::debug!("Pong received");
            }
            InboundMessage::Error { message } => {
                tracing::error!(%message, "Stream error from endpoint");
                let _ = self.event_tx.send(StreamEvent::Error(message)).await;
            }
            InboundMessage::AuthFailure { reason } => {
                // A post-connect credential rejection forces disconnect.
                return Err(StreamError::AuthenticationRejected(reason));
            }
            InboundMessage::AuthSuccess => {
                tracing::debug!("Duplicate auth acknowledgment ignored");
            }
            InboundMessage::Unknown { message_type } => {
                tracing::warn!(message_type, "Dropping unrecognized message type");
            }
        }

        Ok(None)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn send_command(&self, message: OutboundMessage) {
        if let Some(tx) = self.command_tx.lock().as_ref()
            && tx.send(message).is_err()
        {
            tracing::debug!("Stream command channel closed");
        }
    }
}
