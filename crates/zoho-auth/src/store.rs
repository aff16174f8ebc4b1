//! Token store abstraction
//!
//! A store persists the refresh token and a bounded history of token records.
//! The `CredentialManager` decides when to write; the store owns the format.
//! `FileTokenStore` is the default backend, `MemoryTokenStore` keeps
//! everything in-process for embedders that persist elsewhere.
//!
//! Methods return boxed futures so stores can be shared as
//! `Arc<dyn TokenStore>`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::HISTORY_LIMIT;
use crate::error::{Error, Result};
use crate::token::{TokenRecord, TokenResponse, unix_now};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything a store persists.
///
/// Unknown keys are rejected, so a file in the old single-record layout is
/// reported as corrupt instead of being read as an empty history.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreState {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    pub history: Vec<TokenRecord>,
}

impl StoreState {
    /// Most recently appended record.
    pub fn latest(&self) -> Option<&TokenRecord> {
        self.history.last()
    }

    /// Append a record for `response` issued at `now` and return it.
    ///
    /// The top-level refresh token only changes when the response carries a
    /// new one. History keeps the newest `HISTORY_LIMIT` records.
    pub fn append(&mut self, response: &TokenResponse, now: i64) -> TokenRecord {
        let record = TokenRecord::issue(response, now, &self.refresh_token);
        if let Some(refresh) = response.refresh_token() {
            self.refresh_token = refresh.to_string();
        }

        let keep = HISTORY_LIMIT - 1;
        if self.history.len() > keep {
            let evict = self.history.len() - keep;
            self.history.drain(..evict);
        }
        self.history.push(record.clone());
        record
    }
}

/// Durable home of the credential history.
pub trait TokenStore: Send + Sync {
    /// Whether the backing store is present and readable. Never errors.
    fn exists(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Read the whole persisted state.
    ///
    /// `NotFound` when nothing has been persisted yet, `CorruptStore` when
    /// something is there but does not parse.
    fn load_all(&self) -> StoreFuture<'_, StoreState>;

    /// Append a record built from `response`, stamped with the current time.
    fn save<'a>(&'a self, response: &'a TokenResponse) -> StoreFuture<'a, TokenRecord>;

    /// The most recently appended record, `NotFound` if history is empty.
    fn load_latest(&self) -> StoreFuture<'_, TokenRecord> {
        Box::pin(async move {
            let state = self.load_all().await?;
            state
                .latest()
                .cloned()
                .ok_or_else(|| Error::NotFound("token history is empty".into()))
        })
    }

    /// The persisted refresh token, empty when nothing has been stored.
    fn current_refresh_token(&self) -> StoreFuture<'_, String> {
        Box::pin(async move {
            match self.load_all().await {
                Ok(state) => Ok(state.refresh_token),
                Err(Error::NotFound(_)) => Ok(String::new()),
                Err(e) => Err(e),
            }
        })
    }
}

/// In-process store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<Option<StoreState>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, e.g. one restored from another backend.
    pub fn with_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn exists(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.is_some() })
    }

    fn load_all(&self) -> StoreFuture<'_, StoreState> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .clone()
                .ok_or_else(|| Error::NotFound("memory store is empty".into()))
        })
    }

    fn save<'a>(&'a self, response: &'a TokenResponse) -> StoreFuture<'a, TokenRecord> {
        Box::pin(async move {
            let mut guard = self.state.lock().await;
            let state = guard.get_or_insert_with(StoreState::default);
            let record = state.append(response, unix_now());
            debug!(history = state.history.len(), "saved token record to memory store");
            Ok(record)
        })
    }
}
