//! Authenticated access to the Zoho REST API
//!
//! `ZohoClient` asks the `CredentialManager` for a fresh access token before
//! every request and sends it as `Authorization: Zoho-oauthtoken <token>`.
//! Token lifecycle lives entirely in `zoho-auth`; this crate only attaches
//! the result.

pub mod client;
pub mod error;
pub mod headers;

pub use client::ZohoClient;
pub use error::{Error, Result};
pub use headers::{HeaderInjection, inject_headers};
