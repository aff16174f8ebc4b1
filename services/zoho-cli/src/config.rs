//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The file path itself comes from `--config` or CONFIG_PATH (parsed by clap).
//! The client secret is loaded from ZOHO_CLIENT_SECRET or client_secret_file,
//! never stored in the TOML directly. Unknown keys are rejected so a typo
//! does not silently fall back to a default.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zoho_api::HeaderInjection;
use zoho_auth::{API_BASE_URL, CredentialSettings, DEFAULT_EXCHANGE_TIMEOUT_SECS, TOKEN_ENDPOINT};

/// Environment variable holding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "ZOHO_CLIENT_SECRET";

/// Config file read when neither `--config` nor CONFIG_PATH is given
pub const DEFAULT_CONFIG_PATH: &str = "zoho-oauth.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// OAuth client and token store settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip, default = "empty_secret")]
    pub client_secret: Secret<String>,
    /// Path to a file containing the client secret (alternative to ZOHO_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub token_file: PathBuf,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Business-API settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
        }
    }
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn default_oauth_url() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_api_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. ZOHO_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        validate_url("oauth_url", &config.oauth.oauth_url)?;
        validate_url("base_url", &config.api.base_url)?;

        if !(1..=300).contains(&config.oauth.timeout_secs) {
            return Err(common::Error::Config(format!(
                "timeout_secs must be between 1 and 300, got: {}",
                config.oauth.timeout_secs
            )));
        }

        if config.oauth.token_file.as_os_str().is_empty() {
            return Err(common::Error::Config("token_file must not be empty".into()));
        }

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.oauth.client_secret = Secret::new(secret);
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.oauth.client_secret = Secret::new(secret.trim().to_owned());
        }

        if config.oauth.client_secret.is_empty() {
            return Err(common::Error::Config(format!(
                "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        }

        Ok(config)
    }

    /// Config file path: the `--config` / `CONFIG_PATH` value, else the default.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        cli_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth.timeout_secs)
    }

    /// Settings for the credential manager. `setup_mode` skips the
    /// readiness check so a fresh install can run `setup`.
    pub fn credential_settings(&self, setup_mode: bool) -> CredentialSettings {
        CredentialSettings::new(
            self.oauth.client_id.clone(),
            self.oauth.client_secret.clone(),
        )
        .with_setup_mode(setup_mode)
        .with_exchange_timeout(self.exchange_timeout())
    }
}

fn validate_url(field: &str, url: &str) -> common::Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )));
    }
    Ok(())
}
