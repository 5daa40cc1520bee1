//! Brokerage REST Client
//!
//! reqwest adapter implementing [`BrokerApi`] against the endpoint's
//! JSON-over-HTTPS contract. Every call carries the `APIKEY`, `Authorization`
//! and `Checker` headers; every failure leaves this module as a
//! [`ClassifiedError`].
//!
//! There is no internal retry loop: a timed-out call classifies as TIMEOUT
//! and is surfaced as-is. Retry policy belongs to callers — the session
//! manager's bounded heartbeat retry is the only automatic retry in the
//! system.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::{
    AuthResponse, BrokerErrorBody, LoginRequest, OrderAck, OrderCancelPayload, OrderModifyPayload,
    OrderSubmitPayload, RefreshRequest,
};
use super::error::ClassifiedError;
use crate::application::ports::BrokerApi;
use crate::infrastructure::cipher::CredentialCipher;
use crate::infrastructure::config::{ApiCredentials, BrokerSettings};

/// Endpoint paths of the brokerage REST API.
mod endpoints {
    pub const LOGIN_USER: &str = "/api/LoginUser";
    pub const SESSION_REFRESH: &str = "/api/SessionRefresh";
    pub const HEARTBEAT: &str = "/api/Heartbeat";
    pub const LOGOUT_USER: &str = "/api/LogoutUser";
    pub const SEND_ORDER: &str = "/api/SendOrder";
    pub const MODIFY_ORDER: &str = "/api/ModifyOrder";
    pub const DELETE_ORDER: &str = "/api/DeleteOrder";
    pub const TODAYS_TRANSACTION: &str = "/api/TodaysTransaction";
}

/// HTTP client for the brokerage REST API.
#[derive(Debug, Clone)]
pub struct BrokerHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cipher: CredentialCipher,
}

impl BrokerHttpClient {
    /// Create a client from transport settings and credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid cipher key or the
    /// underlying HTTP client cannot be built.
    pub fn new(
        settings: &BrokerSettings,
        credentials: &ApiCredentials,
    ) -> Result<Self, ClassifiedError> {
        let cipher = CredentialCipher::from_api_code(credentials.api_key()).map_err(|err| {
            ClassifiedError::new(
                super::error::ErrorKind::Authentication,
                format!("invalid API key: {err}"),
            )
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()
            .map_err(ClassifiedError::from)?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key().to_string(),
            cipher,
        })
    }

    /// The cipher keyed by this client's API code.
    #[must_use]
    pub const fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// POST a JSON body to an endpoint and decode the JSON response.
    async fn post<T: DeserializeOwned, P: Serialize + Sync>(
        &self,
        endpoint: &str,
        token: Option<&str>,
        body: &P,
    ) -> Result<T, ClassifiedError> {
        let payload = serde_json::to_string(body).map_err(|err| {
            ClassifiedError::new(
                super::error::ErrorKind::Unknown,
                format!("request serialization failed: {err}"),
            )
        })?;

        let checker =
            CredentialCipher::request_checker(&self.api_key, &self.base_url, endpoint, &payload);

        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .header("APIKEY", &self.api_key)
            .header("Checker", checker)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(ClassifiedError::from)?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await.map_err(ClassifiedError::from)?;
            if text.is_empty() {
                return serde_json::from_str("null").map_err(|err| {
                    ClassifiedError::new(
                        super::error::ErrorKind::Unknown,
                        format!("malformed response payload: {err}"),
                    )
                });
            }
            return serde_json::from_str(&text).map_err(|err| {
                ClassifiedError::new(
                    super::error::ErrorKind::Unknown,
                    format!("malformed response payload: {err}"),
                )
            });
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<BrokerErrorBody>(&body_text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                if body_text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    body_text
                }
            });

        let mut err = ClassifiedError::from_status(status.as_u16(), message);
        if let Some(secs) = retry_after {
            err = err.with_retry_after(secs);
        }
        tracing::warn!(endpoint, status = status.as_u16(), kind = %err.kind, "Brokerage call failed");
        Err(err)
    }
}

#[async_trait]
impl BrokerApi for BrokerHttpClient {
    async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, ClassifiedError> {
        let encrypted = self.cipher.encrypt(password).map_err(|err| {
            ClassifiedError::new(
                super::error::ErrorKind::Authentication,
                format!("credential encryption failed: {err}"),
            )
        })?;
        let request = LoginRequest {
            username: username.to_string(),
            password: encrypted,
        };
        self.post(endpoints::LOGIN_USER, None, &request).await
    }

    async fn refresh_session(&self, token: &str) -> Result<AuthResponse, ClassifiedError> {
        let request = RefreshRequest {
            refresh_token: token.to_string(),
        };
        self.post(endpoints::SESSION_REFRESH, Some(token), &request)
            .await
    }

    async fn heartbeat(&self, token: &str) -> Result<(), ClassifiedError> {
        let _: serde_json::Value = self
            .post(endpoints::HEARTBEAT, Some(token), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn logout(&self, token: &str) -> Result<(), ClassifiedError> {
        let _: serde_json::Value = self
            .post(endpoints::LOGOUT_USER, Some(token), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn submit_order(
        &self,
        token: &str,
        payload: OrderSubmitPayload,
    ) -> Result<OrderAck, ClassifiedError> {
        self.post(endpoints::SEND_ORDER, Some(token), &payload).await
    }

    async fn modify_order(
        &self,
        token: &str,
        payload: OrderModifyPayload,
    ) -> Result<OrderAck, ClassifiedError> {
        self.post(endpoints::MODIFY_ORDER, Some(token), &payload)
            .await
    }

    async fn cancel_order(
        &self,
        token: &str,
        payload: OrderCancelPayload,
    ) -> Result<OrderAck, ClassifiedError> {
        self.post(endpoints::DELETE_ORDER, Some(token), &payload)
            .await
    }

    async fn active_orders(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<OrderAck>, ClassifiedError> {
        let body = serde_json::json!({ "user_id": user_id, "status": "ACTIVE" });
        self.post(endpoints::TODAYS_TRANSACTION, Some(token), &body)
            .await
    }
}
