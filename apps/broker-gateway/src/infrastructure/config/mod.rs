//! Gateway Configuration
//!
//! Configuration is loaded from environment variables with typed parse
//! helpers. Every tunable has a documented default; a missing or unparsable
//! value falls back to the default, never to an error. Only the API key is
//! required.

use std::time::Duration;

use rust_decimal::Decimal;

/// Production REST base URL of the brokerage endpoint.
const DEFAULT_REST_BASE_URL: &str = "https://api.broker.example.com";

/// Production streaming URL of the brokerage endpoint.
const DEFAULT_STREAM_URL: &str = "wss://stream.broker.example.com/ws";

/// Brokerage API credentials.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
}

impl ApiCredentials {
    /// Create credentials from a full API key.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// The full API key (sent as the `APIKEY` header).
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// REST transport settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// REST base URL.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Total request timeout (connect + read).
    pub read_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_BASE_URL.to_string(),
            connect_timeout: Duration::from_millis(30_000),
            read_timeout: Duration::from_millis(60_000),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between heartbeat calls.
    pub heartbeat_interval: Duration,
    /// Refresh fires this long before token expiry.
    pub refresh_buffer: Duration,
    /// Consecutive heartbeat failures tolerated before forced logout.
    pub max_heartbeat_retries: u32,
    /// Base unit of the linear heartbeat retry backoff (attempt × base).
    pub heartbeat_retry_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            refresh_buffer: Duration::from_secs(300),
            max_heartbeat_retries: 3,
            heartbeat_retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Streaming connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket URL.
    pub url: String,
    /// Interval between PING messages while connected.
    pub ping_interval: Duration,
    /// Bounded wait for the endpoint's authentication acknowledgment.
    pub auth_timeout: Duration,
    /// Base unit of the linear reconnect backoff (attempt × base).
    pub reconnect_base_delay: Duration,
    /// Maximum reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            ping_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Order validation bounds.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    /// Maximum order quantity.
    pub max_quantity: Decimal,
    /// Minimum price and stop price.
    pub min_price: Decimal,
    /// Maximum price and stop price.
    pub max_price: Decimal,
    /// Minimum order notional value (price × quantity).
    pub min_order_value: Decimal,
    /// Maximum order notional value.
    pub max_order_value: Decimal,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_quantity: Decimal::new(10_000, 0),
            min_price: Decimal::new(1, 2),
            max_price: Decimal::new(10_000, 0),
            min_order_value: Decimal::new(100, 0),
            max_order_value: Decimal::new(1_000_000, 0),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API credentials.
    pub credentials: ApiCredentials,
    /// REST transport settings.
    pub broker: BrokerSettings,
    /// Session lifecycle settings.
    pub session: SessionSettings,
    /// Streaming connection settings.
    pub stream: StreamSettings,
    /// Order validation bounds.
    pub validation: ValidationLimits,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error only when `BROKER_API_KEY` is missing or empty;
    /// every other option falls back to its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("BROKER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("BROKER_API_KEY".to_string()))?;
        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("BROKER_API_KEY".to_string()));
        }

        let broker = BrokerSettings {
            base_url: parse_env_string("BROKER_REST_BASE_URL", DEFAULT_REST_BASE_URL),
            connect_timeout: parse_env_duration_millis(
                "BROKER_CONNECT_TIMEOUT_MS",
                BrokerSettings::default().connect_timeout,
            ),
            read_timeout: parse_env_duration_millis(
                "BROKER_READ_TIMEOUT_MS",
                BrokerSettings::default().read_timeout,
            ),
        };

        let session = SessionSettings {
            heartbeat_interval: parse_env_duration_secs(
                "BROKER_HEARTBEAT_INTERVAL_SECS",
                SessionSettings::default().heartbeat_interval,
            ),
            refresh_buffer: parse_env_duration_secs(
                "BROKER_REFRESH_BUFFER_SECS",
                SessionSettings::default().refresh_buffer,
            ),
            max_heartbeat_retries: parse_env_u32(
                "BROKER_MAX_HEARTBEAT_RETRIES",
                SessionSettings::default().max_heartbeat_retries,
            ),
            heartbeat_retry_backoff: parse_env_duration_millis(
                "BROKER_HEARTBEAT_RETRY_BACKOFF_MS",
                SessionSettings::default().heartbeat_retry_backoff,
            ),
        };

        let stream = StreamSettings {
            url: parse_env_string("BROKER_STREAM_URL", DEFAULT_STREAM_URL),
            ping_interval: parse_env_duration_secs(
                "BROKER_STREAM_PING_INTERVAL_SECS",
                StreamSettings::default().ping_interval,
            ),
            auth_timeout: parse_env_duration_secs(
                "BROKER_STREAM_AUTH_TIMEOUT_SECS",
                StreamSettings::default().auth_timeout,
            ),
            reconnect_base_delay: parse_env_duration_millis(
                "BROKER_RECONNECT_BASE_DELAY_MS",
                StreamSettings::default().reconnect_base_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                "BROKER_MAX_RECONNECT_ATTEMPTS",
                StreamSettings::default().max_reconnect_attempts,
            ),
        };

        let validation = ValidationLimits {
            max_quantity: parse_env_decimal(
                "BROKER_MAX_QUANTITY",
                ValidationLimits::default().max_quantity,
            ),
            min_price: parse_env_decimal("BROKER_MIN_PRICE", ValidationLimits::default().min_price),
            max_price: parse_env_decimal("BROKER_MAX_PRICE", ValidationLimits::default().max_price),
            min_order_value: parse_env_decimal(
                "BROKER_MIN_ORDER_VALUE",
                ValidationLimits::default().min_order_value,
            ),
            max_order_value: parse_env_decimal(
                "BROKER_MAX_ORDER_VALUE",
                ValidationLimits::default().max_order_value,
            ),
        };

        Ok(Self {
            credentials: ApiCredentials::new(api_key),
            broker,
            session,
            stream,
            validation,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
