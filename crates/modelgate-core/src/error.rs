//! Error taxonomy shared by every Modelgate crate.
//!
//! - [`Error::Configuration`]: unresolved model, missing field, unknown protocol.
//! - [`Error::Authentication`]: no usable stored credential; carries a login hint.
//! - [`Error::Transport`] / [`Error::Network`] / [`Error::Cancelled`]: wire failures.
//! - [`Error::Decode`]: malformed JSON from a provider.
//! - [`Error::Store`]: credential store I/O.
//!
//! None of these are retried internally.

use thiserror::Error;

/// Result alias used throughout Modelgate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication error: {message} (run: {hint})")]
    Authentication { message: String, hint: String },

    #[error("API request failed: status {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("credential store error: {0}")]
    Store(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Authentication error pointing the user at the login command for `provider`.
    pub fn not_logged_in(provider: &str, message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
            hint: login_hint(provider),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}

/// The command a user runs to (re-)authenticate a provider family.
pub fn login_hint(provider: &str) -> String {
    format!("modelgate auth login --provider {provider}")
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_logged_in_carries_hint() {
        let err = Error::not_logged_in("anthropic", "no credentials for anthropic");
        assert!(err.is_authentication());
        let text = err.to_string();
        assert!(text.contains("no credentials for anthropic"));
        assert!(text.contains("modelgate auth login --provider anthropic"));
    }

    #[test]
    fn test_transport_display_has_status_and_body() {
        let err = Error::Transport {
            status: 429,
            body: "{\"error\":\"rate limited\"}".into(),
        };
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("rate limited"));
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Decode(_)));
    }
}
