//! Session Manager
//!
//! Owns the authenticated brokerage session: login, scheduled token refresh,
//! heartbeat and logout. This is the single source of truth for "are we
//! authenticated" — all reads and writes of session state go through one
//! mutex-guarded store, and every background activity is a cancellable task
//! tied to the session's lifecycle so teardown is atomic: no task can
//! observe a ghost-active session after logout.
//!
//! # Failure Policy
//!
//! - Heartbeat failures are retried up to a bounded count with linear
//!   backoff (`attempt × backoff`); exhausting the retries forces logout
//!   rather than continuing with a possibly-dead session.
//! - Token refresh failure is not retried: a refresh failure usually means
//!   the refresh token itself is invalid, so the session is deactivated
//!   immediately and the heartbeat cancelled.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::application::ports::BrokerApi;
use crate::domain::session::Session;
use crate::infrastructure::broker::error::ClassifiedError;
use crate::infrastructure::config::SessionSettings;

/// Mutable session state behind the manager's lock.
#[derive(Debug, Default)]
struct SessionState {
    /// The current session, if any.
    current: Option<Session>,
    /// Deactivated sessions, retained read-only for audit.
    history: Vec<Session>,
}

struct Inner<B> {
    broker: Arc<B>,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Manages the authenticated brokerage session and its background tasks.
pub struct SessionManager<B: BrokerApi> {
    inner: Arc<Inner<B>>,
}

impl<B: BrokerApi> Clone for SessionManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrokerApi + 'static> SessionManager<B> {
    /// Create a manager over the given broker API.
    #[must_use]
    pub fn new(broker: Arc<B>, settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                settings,
                state: RwLock::new(SessionState::default()),
                cancel: Mutex::new(None),
            }),
        }
    }

    /// Authenticate against the brokerage endpoint.
    ///
    /// On success the session is stored, and two background activities start:
    /// a recurring heartbeat and a refresh sleeper timed to fire
    /// `expires_at - refresh_buffer` before expiry. Any previous session is
    /// logged out first.
    ///
    /// # Errors
    ///
    /// Returns the classified login failure; no session state is kept on
    /// failure.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ClassifiedError> {
        self.logout().await;

        tracing::info!(username, "Authenticating with brokerage endpoint");
        let response = self.inner.broker.login(username, password).await?;

        let now = Utc::now();
        let session = Session::new(
            response.token,
            response.hash.unwrap_or_default(),
            now,
            response.expires_at,
        );
        let expires_at = session.expires_at;

        let cancel = CancellationToken::new();
        self.inner.state.write().current = Some(session);
        *self.inner.cancel.lock() = Some(cancel.clone());

        tokio::spawn(heartbeat_loop(Arc::clone(&self.inner), cancel.clone()));
        tokio::spawn(refresh_loop(Arc::clone(&self.inner), cancel));

        tracing::info!(%expires_at, "Authentication successful");
        Ok(())
    }

    /// Whether a usable session exists right now.
    ///
    /// Checks both the active flag and the expiry clock: a silently expired
    /// session reports false even before any background task notices.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .read()
            .current
            .as_ref()
            .is_some_and(|s| s.is_usable(Utc::now()))
    }

    /// The current session token, when usable.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        let state = self.inner.state.read();
        let session = state.current.as_ref()?;
        session.is_usable(Utc::now()).then(|| session.token.clone())
    }

    /// The current authorization hash, when usable (streaming handshake).
    #[must_use]
    pub fn auth_hash(&self) -> Option<String> {
        let state = self.inner.state.read();
        let session = state.current.as_ref()?;
        session
            .is_usable(Utc::now())
            .then(|| session.auth_hash.clone())
    }

    /// A read-only copy of the current session, for inspection.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.inner.state.read().current.clone()
    }

    /// Read-only audit history of deactivated sessions.
    #[must_use]
    pub fn session_history(&self) -> Vec<Session> {
        self.inner.state.read().history.clone()
    }

    /// Log out: cancel background tasks, deactivate the session, notify the
    /// endpoint best-effort.
    ///
    /// Idempotent — calling on an already-inactive session is a no-op.
    pub async fn logout(&self) {
        let Some(token) = deactivate(&self.inner) else {
            return;
        };

        tracing::info!("Logging out");
        if let Err(err) = self.inner.broker.logout(&token).await {
            tracing::warn!(error = %err, "Remote logout failed");
        }
    }

    /// Final teardown: logout and drop all state.
    pub async fn shutdown(&self) {
        self.logout().await;
    }
}

/// Deactivate the current session and cancel its background tasks.
///
/// Returns the token of the session that was deactivated, if there was an
/// active one. The cancellation and the state flip happen under the locks so
/// no background task can see an active session with a cancelled token.
fn deactivate<B>(inner: &Inner<B>) -> Option<String> {
    let token = {
        let mut state = inner.state.write();
        let session = state.current.as_mut()?;
        if !session.is_active {
            return None;
        }
        session.deactivate();
        let token = session.token.clone();
        let retired = state.current.take();
        if let Some(retired) = retired {
            state.history.push(retired);
        }
        token
    };

    if let Some(cancel) = inner.cancel.lock().take() {
        cancel.cancel();
    }

    Some(token)
}

/// Recurring heartbeat tied to the session lifecycle.
async fn heartbeat_loop<B: BrokerApi + 'static>(inner: Arc<Inner<B>>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.settings.heartbeat_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; the session was just validated by
    // login, so skip it.
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Heartbeat cancelled");
                return;
            }
            _ = interval.tick() => {
                let token = {
                    let state = inner.state.read();
                    state.current.as_ref().and_then(|s| {
                        s.is_usable(Utc::now()).then(|| s.token.clone())
                    })
                };
                let Some(token) = token else {
                    tracing::debug!("Heartbeat stopping: no usable session");
                    return;
                };

                if heartbeat_with_retries(&inner, &token).await.is_err() {
                    tracing::error!("Heartbeat retries exhausted, forcing logout");
                    force_logout(&inner);
                    return;
                }
            }
        }
    }
}

/// Send one heartbeat, retrying up to the configured bound with linear
/// backoff (`attempt × backoff`).
async fn heartbeat_with_retries<B: BrokerApi>(
    inner: &Arc<Inner<B>>,
    token: &str,
) -> Result<(), ClassifiedError> {
    let max_attempts = inner.settings.max_heartbeat_retries.max(1);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match inner.broker.heartbeat(token).await {
            Ok(()) => {
                tracing::debug!("Heartbeat successful");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "Heartbeat failed");
                last_err = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(inner.settings.heartbeat_retry_backoff * attempt).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        ClassifiedError::from_transport("heartbeat failed without a reported error")
    }))
}

/// One-shot refresh sleeper, re-armed after each successful refresh.
async fn refresh_loop<B: BrokerApi + 'static>(inner: Arc<Inner<B>>, cancel: CancellationToken) {
    loop {
        let (token, expires_at) = {
            let state = inner.state.read();
            match state.current.as_ref().filter(|s| s.is_active) {
                Some(s) => (s.token.clone(), s.expires_at),
                None => return,
            }
        };

        let fire_at = expires_at
            - chrono::Duration::from_std(inner.settings.refresh_buffer)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let Ok(delay) = (fire_at - Utc::now()).to_std() else {
            // The refresh point is already past; the session will simply
            // expire on its own clock.
            tracing::debug!("Refresh point already past, not scheduling");
            return;
        };

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Scheduled refresh cancelled");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }

        tracing::info!("Refreshing session token");
        match inner.broker.refresh_session(&token).await {
            Ok(response) => {
                let now = Utc::now();
                let mut state = inner.state.write();
                match state.current.as_mut().filter(|s| s.is_active) {
                    Some(session) => {
                        session.refreshed(response.token, response.expires_at, now);
                        tracing::info!(expires_at = %session.expires_at, "Token refresh successful");
                    }
                    None => return,
                }
            }
            Err(err) => {
                // Refresh is never retried: the refresh token itself is
                // likely invalid.
                tracing::error!(error = %err, "Token refresh failed, deactivating session");
                force_logout(&inner);
                return;
            }
        }
    }
}

/// Deactivate locally and notify the endpoint without blocking the caller.
fn force_logout<B: BrokerApi + 'static>(inner: &Arc<Inner<B>>) {
    if let Some(token) = deactivate(inner) {
        let broker = Arc::clone(&inner.broker);
        tokio::spawn(async move {
            if let Err(err) = broker.logout(&token).await {
                tracing::warn!(error = %err, "Remote logout failed");
            }
        });
    }
}
