//! Error taxonomy for the credential lifecycle
//!
//! `NotFound` is a normal outcome when the store has never been written;
//! `CorruptStore` means the store exists but cannot be trusted and an
//! operator has to look at it. The two are never merged.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credentials not configured: {0}")]
    NotConfigured(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("token store is corrupt: {0}")]
    CorruptStore(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("access token expired and no refresh token is on file")]
    RefreshTokenMissing,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("token endpoint rejected the exchange: {0}")]
    Rejected(String),

    #[error("token exchange timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Whether a caller may reasonably retry the same operation later.
    ///
    /// Only network-level failures qualify. A rejected refresh usually means
    /// consent was revoked and setup has to be redone.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
