#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Broker Gateway - Brokerage Integration Core
//!
//! Connects the trading platform to an external brokerage endpoint. Three
//! concerns stay consistent under failure:
//!
//! - a session with a short-lived credential that is silently refreshed and
//!   re-established (`infrastructure::session`)
//! - a persistent streaming connection that reconnects, resubscribes and
//!   resynchronizes without losing or duplicating events
//!   (`infrastructure::stream`)
//! - an order pipeline that validates, risk-checks, executes and tracks
//!   state transitions while classifying every endpoint failure into a typed
//!   outcome (`application::pipeline`)
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: orders, sessions, subscriptions — pure types
//! - **Application**: ports, validation, the order pipeline
//! - **Infrastructure**: config, credential cipher, REST client, session
//!   manager, stream client, telemetry

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - pure order/session/subscription types.
pub mod domain;

/// Application layer - ports, validation and the order pipeline.
pub mod application;

/// Infrastructure layer - adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    Order, OrderError, OrderSide, OrderStateMachine, OrderStatus, OrderType, Session,
    StreamChannel, Subscription, SubscriptionSet, TimeInForce,
};

// Application surface
pub use application::{
    BrokerApi, EventPublisher, InMemoryOrderTracker, ModifyRequest, NoOpEventPublisher,
    OrderEvent, OrderPipeline, OrderRequest, OrderTracker, RiskCheck, RiskDecision,
    ValidationResult, generate_client_order_id,
};

// Infrastructure config
pub use infrastructure::config::{
    ApiCredentials, BrokerSettings, ConfigError, GatewayConfig, SessionSettings, StreamSettings,
    ValidationLimits,
};

// Credential cipher
pub use infrastructure::cipher::{CipherError, CredentialCipher};

// Brokerage REST adapter
pub use infrastructure::broker::{BrokerHttpClient, ClassifiedError, ErrorKind};

// Session manager
pub use infrastructure::session::SessionManager;

// Streaming client
pub use infrastructure::stream::{
    ConnectionState, StreamClient, StreamCredential, StreamError, StreamEvent,
};
