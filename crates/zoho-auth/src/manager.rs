//! Credential lifecycle manager
//!
//! Turns a one-time grant code into a stored refresh token, hands out the
//! cached access token while it is fresh, and refreshes it synchronously once
//! it is not. Nothing here retries: a rejected refresh usually means consent
//! was revoked, and the caller has to decide whether to run setup again.
//!
//! States:
//! - Uninitialized → Authenticated (setup with a grant code)
//! - Authenticated → Stale (access token TTL + skew elapsed)
//! - Stale → Authenticated (refresh succeeded)
//! - Stale → Failed (refresh rejected or timed out)
//! - Failed → Authenticated (a later refresh or setup succeeds)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{AUTH_SCHEME, DEFAULT_EXCHANGE_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::gateway::{AuthGateway, ExchangeRequest, Grant};
use crate::store::TokenStore;
use crate::token::{TokenRecord, TokenResponse, unix_now};

/// Client credentials and behavior switches for a manager.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Skip the readiness check at construction so `setup` can run.
    pub setup_mode: bool,
    /// Upper bound on one token exchange, independent of the transport.
    pub exchange_timeout: Duration,
}

impl CredentialSettings {
    pub fn new(client_id: impl Into<String>, client_secret: Secret<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            setup_mode: false,
            exchange_timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
        }
    }

    pub fn with_setup_mode(mut self, setup_mode: bool) -> Self {
        self.setup_mode = setup_mode;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }
}

/// Where the stored credentials stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Uninitialized,
    Authenticated,
    Stale,
    Failed,
}

impl CredentialState {
    /// Status label for logging and the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Uninitialized => "uninitialized",
            CredentialState::Authenticated => "authenticated",
            CredentialState::Stale => "stale",
            CredentialState::Failed => "failed",
        }
    }
}

/// A validated access token and the unix second it stops being valid.
///
/// Returned by value from `ensure_authenticated`; callers should not hold on
/// to it past `valid_until` and should ask the manager again instead.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: Secret<String>,
    valid_until: i64,
}

impl AccessToken {
    fn from_record(record: &TokenRecord) -> Result<Self> {
        let valid_until = record.valid_until().ok_or_else(|| {
            Error::InvalidState("token record has no expiry information".into())
        })?;
        Ok(Self {
            token: Secret::new(record.access_token()?.to_string()),
            valid_until,
        })
    }

    pub fn secret(&self) -> &str {
        self.token.expose()
    }

    pub fn valid_until(&self) -> i64 {
        self.valid_until
    }

    /// Value for the `Authorization` header of a business-API request.
    pub fn authorization_header(&self) -> String {
        format!("{AUTH_SCHEME} {}", self.token.expose())
    }
}

pub struct CredentialManager {
    settings: CredentialSettings,
    store: Arc<dyn TokenStore>,
    gateway: Arc<dyn AuthGateway>,
    /// Held for the whole refresh path so only one exchange is in flight.
    refresh_lock: Mutex<()>,
    refresh_failed: AtomicBool,
}

impl CredentialManager {
    /// Build a manager without touching the store.
    pub fn new(
        settings: CredentialSettings,
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn AuthGateway>,
    ) -> Self {
        Self {
            settings,
            store,
            gateway,
            refresh_lock: Mutex::new(()),
            refresh_failed: AtomicBool::new(false),
        }
    }

    /// Build a manager and, outside setup mode, fail fast with
    /// `NotConfigured` when there is nothing usable on file.
    pub async fn open(
        settings: CredentialSettings,
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn AuthGateway>,
    ) -> Result<Self> {
        let setup_mode = settings.setup_mode;
        let manager = Self::new(settings, store, gateway);
        if !setup_mode {
            manager.check_ready().await?;
        }
        Ok(manager)
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Verify the store exists and holds a usable record.
    pub async fn check_ready(&self) -> Result<()> {
        if !self.store.exists().await {
            return Err(Error::NotConfigured(
                "no token store available, run setup with a grant code".into(),
            ));
        }
        self.latest_usable().await.map(|_| ())
    }

    /// Exchange a single-use grant code for the initial token pair.
    ///
    /// A corrupt or unreadable store fails before the exchange, leaving the
    /// grant code unused. The store is only written after a successful
    /// exchange. Grant codes are single use, so calling this twice with the
    /// same code fails the second time with `SetupFailed`.
    pub async fn setup(&self, grant_code: &str) -> Result<AccessToken> {
        // Only spend the code when the store can take the result
        match self.store.load_all().await {
            Ok(_) | Err(Error::NotFound(_)) => {}
            Err(e) => {
                warn!(error = %e, "token store unusable, grant code left unexchanged");
                return Err(e);
            }
        }

        let request = self.exchange_request(Grant::AuthorizationCode(Secret::new(
            grant_code.to_string(),
        )));

        let response = match self.exchange(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "grant code exchange failed");
                return Err(Error::SetupFailed(e.to_string()));
            }
        };

        let record = self.store.save(&response).await?;
        self.refresh_failed.store(false, Ordering::Relaxed);
        info!(
            has_refresh_token = response.refresh_token().is_some(),
            valid_until = record.valid_until(),
            "token store initialized from grant code"
        );
        AccessToken::from_record(&record)
    }

    /// Return a fresh access token, refreshing it first if it has expired.
    ///
    /// The fresh-token path only reads the store. The refresh path completes
    /// before returning, so an expired token is never handed out.
    pub async fn ensure_authenticated(&self) -> Result<AccessToken> {
        let record = self.latest_usable().await?;
        if !record.is_expired(unix_now()) {
            return AccessToken::from_record(&record);
        }
        debug!(issued_at = record.issued_at(), "access token expired");
        self.refresh().await
    }

    /// Current lifecycle state derived from the store.
    pub async fn state(&self) -> Result<CredentialState> {
        if self.refresh_failed.load(Ordering::Relaxed) {
            return Ok(CredentialState::Failed);
        }
        match self.store.load_latest().await {
            Ok(record) if record.is_empty() => Ok(CredentialState::Uninitialized),
            Ok(record) if record.is_expired(unix_now()) => Ok(CredentialState::Stale),
            Ok(_) => Ok(CredentialState::Authenticated),
            Err(Error::NotFound(_)) => Ok(CredentialState::Uninitialized),
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        let record = self.latest_usable().await?;
        if !record.is_expired(unix_now()) {
            debug!("reusing token refreshed by a concurrent caller");
            return AccessToken::from_record(&record);
        }

        let refresh_token = self.store.current_refresh_token().await?;
        if refresh_token.is_empty() {
            warn!("access token expired but no refresh token is on file");
            return Err(Error::RefreshTokenMissing);
        }

        let request = self.exchange_request(Grant::RefreshToken(Secret::new(refresh_token)));
        let response = match self.exchange(request).await {
            Ok(response) => response,
            Err(Error::Transport(msg)) => {
                record_refresh("transport_error");
                warn!(error = %msg, "token refresh failed (transient)");
                return Err(Error::Transport(msg));
            }
            Err(e) => {
                self.refresh_failed.store(true, Ordering::Relaxed);
                record_refresh("failed");
                warn!(error = %e, "token refresh rejected, setup may be required");
                return Err(Error::RefreshFailed(e.to_string()));
            }
        };

        let record = self.store.save(&response).await?;
        self.refresh_failed.store(false, Ordering::Relaxed);
        record_refresh("success");
        info!(valid_until = record.valid_until(), "access token refreshed");
        AccessToken::from_record(&record)
    }

    async fn latest_usable(&self) -> Result<TokenRecord> {
        match self.store.load_latest().await {
            Ok(record) if !record.is_empty() => Ok(record),
            Ok(_) | Err(Error::NotFound(_)) => Err(Error::NotConfigured(
                "no tokens found in token store, run setup with a grant code".into(),
            )),
            Err(e) => Err(e),
        }
    }

    fn exchange_request(&self, grant: Grant) -> ExchangeRequest {
        ExchangeRequest {
            client_id: self.settings.client_id.clone(),
            client_secret: self.settings.client_secret.clone(),
            grant,
        }
    }

    /// Run one exchange under the configured deadline and validate the body.
    async fn exchange(&self, request: ExchangeRequest) -> Result<TokenResponse> {
        let timeout = self.settings.exchange_timeout;
        let response = tokio::time::timeout(timeout, self.gateway.exchange(request))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        validate_response(&response)?;
        Ok(response)
    }
}

/// Reject responses the store must never persist, whatever the gateway
/// implementation let through.
fn validate_response(response: &TokenResponse) -> Result<()> {
    if let Some(error) = response.error.as_deref() {
        return Err(Error::Rejected(error.to_string()));
    }
    if response.access_token.is_empty() {
        return Err(Error::Rejected("response has no access token".into()));
    }
    if response.expires_in.is_none() {
        return Err(Error::Rejected("response has no expires_in".into()));
    }
    Ok(())
}

fn record_refresh(outcome: &'static str) {
    metrics::counter!("zoho_token_refresh_total", "outcome" => outcome).increment(1);
}
