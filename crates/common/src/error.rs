//! Configuration errors shared by the binary and its loaders

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_context() {
        let err = Error::Config("client_id must not be empty".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: client_id must not be empty"
        );
    }

    #[test]
    fn io_error_converts_via_question_mark() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/zoho-oauth.toml")?)
        }
        let err = read().unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got: {err:?}");
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn toml_error_converts() {
        let parsed: std::result::Result<toml::Table, _> = toml::from_str("not valid {{{{ toml");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Toml(_)));
    }
}
