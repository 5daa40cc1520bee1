//! Infrastructure Layer
//!
//! Adapters and external integrations: configuration, the credential cipher,
//! the brokerage REST client, the session manager, the streaming client, and
//! tracing setup.

pub mod broker;
pub mod cipher;
pub mod config;
pub mod session;
pub mod stream;
pub mod telemetry;
