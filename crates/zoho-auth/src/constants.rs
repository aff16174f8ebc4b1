//! Zoho OAuth defaults
//!
//! Endpoints for the US data center. Accounts hosted elsewhere (EU, IN, AU,
//! CN) override `oauth_url` and the API base URL in configuration.

/// Token endpoint for grant-code exchange and refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.zoho.com/oauth/v2/token";

/// Base URL of the CRM v2 REST API
pub const API_BASE_URL: &str = "https://www.zohoapis.com/crm/v2";

/// Authorization scheme Zoho expects in front of the access token
pub const AUTH_SCHEME: &str = "Zoho-oauthtoken";

/// Seconds added to a token's TTL before it counts as expired. Forces a
/// refresh slightly before the provider would reject the token.
pub const SKEW_SECS: i64 = 10;

/// Maximum number of records kept in the store history.
pub const HISTORY_LIMIT: usize = 10;

/// Default upper bound on a single token exchange round trip.
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 20;
