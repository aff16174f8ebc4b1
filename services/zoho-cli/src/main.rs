//! Zoho OAuth command-line client
//!
//! One-time setup and day-to-day use of the credential store:
//! 1. `setup <grant-code>` exchanges a console grant code and writes the token file
//! 2. `token` hands out a fresh access token, refreshing when stale; `status`
//!    reports the credential state without touching the network
//! 3. `get`, `post`, and `coql` issue authenticated business-API calls

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zoho_api::ZohoClient;
use zoho_auth::{CredentialManager, FileTokenStore, HttpAuthGateway, TokenStore};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "zoho-oauth", version, about = "Zoho OAuth credential setup and API client")]
struct Cli {
    /// Path to the TOML config file (default: zoho-oauth.toml).
    #[arg(long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// Exchange a single-use grant code and create the token file.
    Setup { grant_code: String },
    /// Print a valid access token, refreshing it if expired.
    Token,
    /// Print the credential state without refreshing.
    Status,
    /// GET an API path and print the JSON response.
    Get { path: String },
    /// POST a JSON body to an API path.
    Post { path: String, body: String },
    /// Run a COQL select query.
    Coql {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

impl Command {
    /// Whether the token store must already hold usable credentials.
    /// `setup` creates them and `status` reports their absence.
    fn requires_ready_store(&self) -> bool {
        !matches!(self, Command::Setup { .. } | Command::Status)
    }
}

/// Mark failures a later retry may fix, so an outage reads differently from
/// revoked consent.
fn retry_hint(err: anyhow::Error) -> anyhow::Error {
    let transient = err.chain().any(|cause| {
        if let Some(auth) = cause.downcast_ref::<zoho_auth::Error>() {
            return auth.is_transient();
        }
        matches!(
            cause.downcast_ref::<zoho_api::Error>(),
            Some(zoho_api::Error::Auth(auth)) if auth.is_transient()
        )
    });
    if transient {
        err.context("transient failure reaching Zoho, retry later")
    } else {
        err
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr as JSON so stdout stays clean for command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command;

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        token_file = %config.oauth.token_file.display(),
        oauth_url = %config.oauth.oauth_url,
        api_base_url = %config.api.base_url,
        headers = config.headers.len(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(config.exchange_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.oauth.token_file.clone()));
    let gateway = Arc::new(
        HttpAuthGateway::new(http.clone(), config.oauth.oauth_url.clone())
            .with_timeout(config.exchange_timeout()),
    );

    // Commands that need credentials fail fast when the token file is missing or empty
    let manager = CredentialManager::open(
        config.credential_settings(!command.requires_ready_store()),
        store,
        gateway,
    )
    .await
    .context("credential store is not ready")?;

    run(command, Arc::new(manager), &config, http)
        .await
        .map_err(retry_hint)
}

async fn run(
    command: Command,
    manager: Arc<CredentialManager>,
    config: &Config,
    http: reqwest::Client,
) -> Result<()> {
    let output = match command {
        Command::Setup { grant_code } => {
            let token = manager
                .setup(&grant_code)
                .await
                .context("setup with grant code failed")?;
            info!(path = %config.oauth.token_file.display(), "token file created");
            serde_json::json!({
                "status": "ok",
                "token_file": config.oauth.token_file.display().to_string(),
                "valid_until": token.valid_until(),
            })
        }
        Command::Token => {
            let token = manager
                .ensure_authenticated()
                .await
                .context("could not obtain an access token")?;
            serde_json::json!({
                "access_token": token.secret(),
                "valid_until": token.valid_until(),
            })
        }
        Command::Status => status_report(&manager).await?,
        Command::Get { path } => client(manager, config, http).get(&path).await?,
        Command::Post { path, body } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("request body must be valid JSON")?;
            client(manager, config, http).post(&path, &body).await?
        }
        Command::Coql { query } => {
            client(manager, config, http)
                .coql(&query.join(" "))
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn client(manager: Arc<CredentialManager>, config: &Config, http: reqwest::Client) -> ZohoClient {
    ZohoClient::new(http, manager)
        .with_base_url(config.api.base_url.clone())
        .with_headers(config.headers.clone())
}

/// Credential state plus metadata of the latest record. Never includes tokens.
async fn status_report(manager: &CredentialManager) -> Result<serde_json::Value> {
    let state = manager.state().await.context("reading credential state")?;
    let mut report = serde_json::json!({ "state": state.label() });

    if let Ok(latest) = manager.store().load_latest().await {
        report["issued_at"] = serde_json::json!(latest.issued_at());
        report["expires_in"] = serde_json::json!(latest.expires_in());
        report["valid_until"] = serde_json::json!(latest.valid_until());
        report["api_domain"] = serde_json::json!(latest.api_domain());
        report["token_type"] = serde_json::json!(latest.token_type());
    }
    let history = manager
        .store()
        .load_all()
        .await
        .map(|s| s.history.len())
        .unwrap_or(0);
    report["history"] = serde_json::json!(history);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoho_auth::{
        AuthGateway, CredentialSettings, ExchangeRequest, MemoryTokenStore, Secret, StoreState,
        TokenResponse,
    };

    fn parse(list: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("zoho-oauth").chain(list.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_setup_with_config() {
        let cli = parse(&["--config", "/etc/zoho.toml", "setup", "1000.GRANT"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/zoho.toml")));
        assert_eq!(
            cli.command,
            Command::Setup {
                grant_code: "1000.GRANT".into()
            }
        );
        assert!(!cli.command.requires_ready_store());
    }

    #[test]
    fn config_flag_may_follow_command() {
        let cli = parse(&["token", "--config", "zoho.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("zoho.toml")));
        assert_eq!(cli.command, Command::Token);
        assert!(cli.command.requires_ready_store());
    }

    #[test]
    fn status_does_not_require_ready_store() {
        let cli = parse(&["status"]).unwrap();
        assert_eq!(cli.command, Command::Status);
        assert!(!cli.command.requires_ready_store());
    }

    #[test]
    fn coql_collects_remaining_words() {
        let cli = parse(&["coql", "select", "Last_Name", "from", "Contacts"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Coql {
                query: vec![
                    "select".into(),
                    "Last_Name".into(),
                    "from".into(),
                    "Contacts".into()
                ]
            }
        );
    }

    #[test]
    fn parses_get_and_post() {
        let get = parse(&["get", "/settings/modules"]).unwrap();
        assert_eq!(
            get.command,
            Command::Get {
                path: "/settings/modules".into()
            }
        );
        let post = parse(&["post", "/Leads", r#"{"data":[]}"#]).unwrap();
        assert_eq!(
            post.command,
            Command::Post {
                path: "/Leads".into(),
                body: r#"{"data":[]}"#.into()
            }
        );
        assert!(post.command.requires_ready_store());
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["setup"]).is_err());
        assert!(parse(&["coql"]).is_err());
        assert!(parse(&["token", "--config"]).is_err());
        assert!(parse(&["refresh-everything"]).is_err());
    }

    #[test]
    fn transient_failures_get_retry_hint() {
        let err = anyhow::Error::from(zoho_auth::Error::Transport("connection reset".into()))
            .context("could not obtain an access token");
        let hinted = retry_hint(err);
        assert!(hinted.to_string().contains("retry later"), "got: {hinted}");

        let api_err = anyhow::Error::from(zoho_api::Error::Auth(zoho_auth::Error::Timeout(
            std::time::Duration::from_secs(20),
        )));
        assert!(retry_hint(api_err).to_string().contains("retry later"));
    }

    #[test]
    fn permanent_failures_keep_their_message() {
        let err = anyhow::Error::from(zoho_auth::Error::RefreshFailed("invalid_code".into()));
        let hinted = retry_hint(err);
        assert!(!hinted.to_string().contains("retry later"), "got: {hinted}");
        assert!(hinted.to_string().contains("invalid_code"));

        let api_err = anyhow::Error::from(zoho_api::Error::Api {
            status: 400,
            body: "{}".into(),
        });
        assert!(!retry_hint(api_err).to_string().contains("retry later"));
    }

    struct RejectingGateway;

    impl AuthGateway for RejectingGateway {
        fn exchange(
            &self,
            _request: ExchangeRequest,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = zoho_auth::Result<TokenResponse>> + Send + '_>,
        > {
            Box::pin(async { Err(zoho_auth::Error::Rejected("invalid_code".into())) })
        }
    }

    #[tokio::test]
    async fn status_report_never_includes_tokens() {
        let mut state = StoreState::default();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        state.append(
            &TokenResponse {
                access_token: "A1-secret".into(),
                refresh_token: Some("R1-secret".into()),
                expires_in: Some(3600),
                ..Default::default()
            },
            now,
        );
        let manager = CredentialManager::new(
            CredentialSettings::new("1000.CLIENT", Secret::new("s3cret".into())),
            Arc::new(MemoryTokenStore::with_state(state)),
            Arc::new(RejectingGateway),
        );

        let report = status_report(&manager).await.unwrap();
        assert_eq!(report["state"], "authenticated");
        assert_eq!(report["history"], 1);
        assert_eq!(report["expires_in"], 3600);
        let rendered = report.to_string();
        assert!(!rendered.contains("A1-secret"), "got: {rendered}");
        assert!(!rendered.contains("R1-secret"), "got: {rendered}");
    }

    #[tokio::test]
    async fn status_report_for_uninitialized_store() {
        let manager = CredentialManager::new(
            CredentialSettings::new("1000.CLIENT", Secret::new("s3cret".into())),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RejectingGateway),
        );

        let report = status_report(&manager).await.unwrap();
        assert_eq!(report["state"], "uninitialized");
        assert_eq!(report["history"], 0);
        assert!(report.get("issued_at").is_none());
    }
}
