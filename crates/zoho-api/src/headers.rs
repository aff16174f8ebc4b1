//! Static header injection for business-API requests
//!
//! Operators can configure extra headers sent with every API call. The
//! `Authorization` header belongs to the credential manager and is never
//! taken from configuration.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// Header name/value pair from configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Insert configured headers, replacing existing values of the same name.
///
/// Invalid names or values are skipped with a warning rather than failing
/// the request.
pub fn inject_headers(headers: &mut HeaderMap, injections: &[HeaderInjection]) {
    for injection in injections {
        let name = match HeaderName::from_str(&injection.name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        if name == AUTHORIZATION {
            warn!(header = %injection.name, "refusing to override authorization header");
            continue;
        }
        let value = match HeaderValue::from_str(&injection.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
}
