//! Brokerage Error Classification
//!
//! Every failure crossing a brokerage-call boundary — HTTP status, transport
//! fault, malformed payload — is normalized into one of a closed set of error
//! kinds, so callers see a stable, finite vocabulary regardless of the
//! transport's native error shape.

use thiserror::Error;

/// Closed taxonomy of brokerage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad or expired credential. Terminal for the current session.
    Authentication,
    /// The caller's request is malformed. Never retried.
    Validation,
    /// Endpoint-side business rejection (risk or exchange rule).
    Order,
    /// Endpoint-side market data outage.
    MarketData,
    /// Rate limit hit; honor the retry-after signal if present.
    RateLimit,
    /// Transport-level timeout.
    Timeout,
    /// Transport-level connection failure.
    Connection,
    /// Endpoint-side server failure.
    Server,
    /// Anything that did not match a known shape.
    Unknown,
}

impl ErrorKind {
    /// Endpoint-side transient kinds that are safe to retry with backoff at
    /// the caller's discretion.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::MarketData | Self::Server)
    }

    /// Stable tag string for logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::Validation => "VALIDATION",
            Self::Order => "ORDER",
            Self::MarketData => "MARKET_DATA",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::Connection => "CONNECTION",
            Self::Server => "SERVER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A brokerage failure normalized to the closed taxonomy.
///
/// Always derived at a call boundary, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{kind}] {message}")]
pub struct ClassifiedError {
    /// Error kind tag.
    pub kind: ErrorKind,
    /// Originating HTTP status, when the failure came from a response.
    pub http_status: Option<u16>,
    /// Human-readable message.
    pub message: String,
    /// Retry-after hint in seconds, when the endpoint supplied one.
    pub retry_after_secs: Option<u64>,
}

impl ClassifiedError {
    /// Build an error with a kind and message, no HTTP context.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// A validation failure originating locally (no remote call involved).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// An order rejection with the collaborator's reason carried verbatim.
    #[must_use]
    pub fn order_rejected(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Order, reason)
    }

    /// A missing or unusable session credential.
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::new(
            ErrorKind::Authentication,
            "no usable session: authenticate first",
        )
    }

    /// Classify an HTTP response status with its message body.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Authentication,
            422 => ErrorKind::Order,
            429 => ErrorKind::RateLimit,
            503 => ErrorKind::MarketData,
            504 => ErrorKind::Timeout,
            500 | 502 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        };
        Self {
            kind,
            http_status: Some(status),
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Classify a transport-level failure by inspecting its message.
    #[must_use]
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let kind = if lowered.contains("timeout") || lowered.contains("timed out") {
            ErrorKind::Timeout
        } else if lowered.contains("connection") || lowered.contains("connect") {
            ErrorKind::Connection
        } else {
            ErrorKind::Unknown
        };
        Self {
            kind,
            http_status: None,
            message,
            retry_after_secs: None,
        }
    }

    /// Attach a retry-after hint.
    #[must_use]
    pub const fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

impl From<reqwest::Error> for ClassifiedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::new(ErrorKind::Timeout, err.to_string());
        }
        if err.is_connect() {
            return Self::new(ErrorKind::Connection, err.to_string());
        }
        if err.is_decode() {
            return Self::new(ErrorKind::Unknown, format!("malformed payload: {err}"));
        }
        Self::from_transport(err.to_string())
    }
}
