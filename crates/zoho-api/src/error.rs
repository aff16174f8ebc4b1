//! Error types for business-API calls

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable access token could be obtained
    #[error(transparent)]
    Auth(#[from] zoho_auth::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-2xx status, or a 2xx body carrying an `error` field
    #[error("Zoho API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
