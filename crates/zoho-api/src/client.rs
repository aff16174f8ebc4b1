//! Zoho business-API client
//!
//! Thin pass-through once authenticated: resolve the path against the API
//! base URL, attach the access token and configured headers, send, and hand
//! back the JSON body.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use zoho_auth::{API_BASE_URL, CredentialManager};

use crate::error::{Error, Result};
use crate::headers::{HeaderInjection, inject_headers};

pub struct ZohoClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
    headers: Vec<HeaderInjection>,
}

impl ZohoClient {
    pub fn new(http: reqwest::Client, credentials: Arc<CredentialManager>) -> Self {
        Self {
            http,
            base_url: API_BASE_URL.to_string(),
            credentials,
            headers: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_headers(mut self, headers: Vec<HeaderInjection>) -> Self {
        self.headers = headers;
        self
    }

    /// Send an authenticated request and return the parsed JSON body.
    ///
    /// `path` is appended to the base URL unless it is already absolute.
    /// An empty response body yields `Value::Null`.
    #[instrument(skip(self, body))]
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.credentials.ensure_authenticated().await?;

        let mut headers = HeaderMap::new();
        inject_headers(&mut headers, &self.headers);
        let auth = HeaderValue::from_str(&token.authorization_header())
            .map_err(|e| Error::InvalidHeader(format!("authorization: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let url = self.url(path);
        debug!(url = %url, "sending api request");

        let mut builder = self.http.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("api request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading api response: {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "api returned error status");
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Http(format!("invalid JSON in api response: {e}")))?;

        if value.get("error").is_some() {
            warn!(status = status.as_u16(), "api response carries an error field");
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(value)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Run a COQL `select` query.
    pub async fn coql(&self, query: &str) -> Result<Value> {
        let body = serde_json::json!({ "select_query": query });
        self.post("/coql", &body).await
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
