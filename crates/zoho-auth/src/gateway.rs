//! Token endpoint exchange
//!
//! The `AuthGateway` trait is the seam between the credential manager and
//! the HTTP transport. Both the grant-code exchange and the refresh POST the
//! same endpoint with a different `grant_type`; `HttpAuthGateway` is the
//! reqwest implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::constants::DEFAULT_EXCHANGE_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The credential being traded in at the token endpoint.
#[derive(Debug, Clone)]
pub enum Grant {
    /// Single-use grant code from the Zoho developer console
    AuthorizationCode(Secret<String>),
    /// Long-lived refresh token from an earlier exchange
    RefreshToken(Secret<String>),
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode(_) => "authorization_code",
            Grant::RefreshToken(_) => "refresh_token",
        }
    }
}

/// Parameters of one token endpoint call.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub grant: Grant,
}

impl ExchangeRequest {
    /// Form parameters in the order the endpoint documents them.
    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("grant_type", self.grant.grant_type()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose().as_str()),
        ];
        match &self.grant {
            Grant::AuthorizationCode(code) => params.push(("code", code.expose().as_str())),
            Grant::RefreshToken(token) => params.push(("refresh_token", token.expose().as_str())),
        }
        params
    }
}

/// Performs token exchanges against the provider.
///
/// Implementations return `Transport` for network failures and provider 5xx
/// responses, `Timeout` when their own deadline passes, and `Rejected` for
/// anything the provider refused, including a 2xx response that carries an
/// `error` field.
pub trait AuthGateway: Send + Sync {
    fn exchange(
        &self,
        request: ExchangeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + '_>>;
}

/// reqwest-backed gateway posting form-encoded parameters.
pub struct HttpAuthGateway {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAuthGateway {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(&self, request: ExchangeRequest) -> Result<TokenResponse> {
        let grant_type = request.grant.grant_type();
        debug!(endpoint = %self.endpoint, grant_type, "posting token exchange");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&request.form_params())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Transport(format!("token endpoint request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            // Provider outages stay transient; only 4xx means the grant was refused
            if status.is_server_error() {
                return Err(Error::Transport(format!(
                    "token endpoint unavailable, returned {status}: {body}"
                )));
            }
            return Err(Error::Rejected(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::Rejected(format!("invalid token response: {e}")))?;

        if let Some(error) = token.error.as_deref() {
            return Err(Error::Rejected(format!("{grant_type} exchange: {error}")));
        }
        if token.access_token.is_empty() {
            return Err(Error::Rejected(format!(
                "{grant_type} exchange returned no access token"
            )));
        }
        Ok(token)
    }
}

impl AuthGateway for HttpAuthGateway {
    fn exchange(
        &self,
        request: ExchangeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + '_>> {
        Box::pin(self.post(request))
    }
}
