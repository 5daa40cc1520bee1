//! Brokerage Session
//!
//! A session is the authenticated context (credential token + authorization
//! hash + expiry) used to authorize brokerage calls. Exactly one session is
//! current per logical connection; deactivated sessions are retained
//! read-only for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated brokerage session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Short-lived credential token returned by the login call.
    pub token: String,
    /// Authorization hash used on the streaming handshake.
    pub auth_hash: String,
    /// When the session was established.
    pub issued_at: DateTime<Utc>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
    /// Last successful refresh, if any.
    pub last_refresh_at: Option<DateTime<Utc>>,
    /// Whether the session is active. Deactivation is permanent.
    pub is_active: bool,
}

impl Session {
    /// Create a freshly issued session.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        auth_hash: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            auth_hash: auth_hash.into(),
            issued_at,
            expires_at,
            last_refresh_at: None,
            is_active: true,
        }
    }

    /// A session is usable only while active and before expiry.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    /// Apply a successful refresh: new token, extended expiry.
    pub fn refreshed(
        &mut self,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) {
        self.token = token.into();
        self.expires_at = expires_at;
        self.last_refresh_at = Some(at);
    }

    /// Deactivate the session.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Time remaining until expiry, zero if already expired.
    #[must_use]
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }
}
