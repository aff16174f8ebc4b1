//! Token records and raw token endpoint responses
//!
//! `TokenResponse` is what the token endpoint returns for both the grant-code
//! exchange and a refresh. `TokenRecord` is the persisted snapshot built from
//! a response at save time: it carries the `issuedAt` stamp used for expiry
//! and the refresh token carried forward from earlier grants.

use serde::{Deserialize, Serialize};

use crate::constants::SKEW_SECS;
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// Zoho answers failed exchanges with HTTP 200 and an `error` field, and
/// refresh responses omit `refresh_token`, so every field is optional here.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenResponse {
    /// The refresh token, if the response carried a non-empty one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// One persisted credential grant.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TokenRecord {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(rename = "issuedAt", default)]
    issued_at: Option<i64>,
}

impl TokenRecord {
    /// A record with no data. Never usable, always expired.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the record persisted for `response`, stamped at `issued_at`.
    ///
    /// `carried_refresh` is the refresh token already on file; it is used when
    /// the response does not include one.
    pub fn issue(response: &TokenResponse, issued_at: i64, carried_refresh: &str) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response
                .refresh_token()
                .unwrap_or(carried_refresh)
                .to_string(),
            api_domain: response.api_domain.clone(),
            token_type: response.token_type.clone(),
            expires_in: response.expires_in,
            issued_at: Some(issued_at),
        }
    }

    /// True when the record holds no access token.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Whether the access token must be refreshed at unix time `now`.
    ///
    /// Expired iff `now - issued_at >= expires_in + SKEW_SECS`. A record
    /// missing either timestamp field is treated as expired.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.valid_until() {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// Unix second at which the record starts counting as expired.
    pub fn valid_until(&self) -> Option<i64> {
        let issued_at = self.issued_at?;
        let ttl = self.expires_in?;
        Some(issued_at.saturating_add(ttl).saturating_add(SKEW_SECS))
    }

    pub fn access_token(&self) -> Result<&str> {
        if self.is_empty() {
            return Err(Error::InvalidState(
                "access token requested from an empty record".into(),
            ));
        }
        Ok(&self.access_token)
    }

    pub fn refresh_token(&self) -> Result<&str> {
        if self.is_empty() {
            return Err(Error::InvalidState(
                "refresh token requested from an empty record".into(),
            ));
        }
        Ok(&self.refresh_token)
    }

    pub fn api_domain(&self) -> Option<&str> {
        self.api_domain.as_deref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.expires_in
    }
}

/// Current wall-clock time as unix seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
