//! Zoho OAuth credential lifecycle
//!
//! Acquires, persists, validates, and refreshes the credentials used for
//! Zoho REST API calls. This crate has no dependency on the CLI and can be
//! embedded directly.
//!
//! Credential flow:
//! 1. Operator generates a single-use grant code in the Zoho developer console
//! 2. `CredentialManager::setup()` exchanges it via `AuthGateway` and saves
//!    the first record through `TokenStore::save()`
//! 3. Every API call goes through `CredentialManager::ensure_authenticated()`,
//!    which serves the stored access token while fresh
//! 4. Once expired, the manager refreshes with the stored refresh token and
//!    appends the new record, carrying the refresh token forward

pub mod constants;
pub mod error;
pub mod file_store;
pub mod gateway;
pub mod manager;
pub mod store;
pub mod token;

pub use common::Secret;
pub use constants::*;
pub use error::{Error, Result};
pub use file_store::FileTokenStore;
pub use gateway::{AuthGateway, ExchangeRequest, Grant, HttpAuthGateway};
pub use manager::{AccessToken, CredentialManager, CredentialSettings, CredentialState};
pub use store::{MemoryTokenStore, StoreState, TokenStore};
pub use token::{TokenRecord, TokenResponse};
