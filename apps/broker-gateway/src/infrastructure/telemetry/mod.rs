//! Tracing Initialization
//!
//! Structured logging via `tracing-subscriber`, filtered by `RUST_LOG` with
//! a sensible default for the gateway's own crate.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `broker_gateway=info` when unset. Calling
/// twice is a no-op (the second registration fails silently).
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("broker_gateway=info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
