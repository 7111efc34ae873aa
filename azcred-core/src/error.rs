//! Top-level error types for credential acquisition.

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::scope::{Scope, ScopeError};
use crate::store::StoreError;
use crate::token::TokenError;

/// Top-level error type for drivers, credentials and the manager.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The request to the identity endpoint could not be sent or read.
    #[error("{driver}: request for scope '{scope}' to {url} failed: {source}")]
    Request {
        driver: String,
        scope: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The identity endpoint answered with a non-success status.
    #[error("{driver}: token request for scope '{scope}' was rejected ({status}): {reason}")]
    Response {
        driver: String,
        scope: String,
        status: StatusCode,
        reason: String,
        error: Option<ProviderError>,
    },

    /// The driver could not obtain a token for another reason.
    #[error("{driver}: {message} (scope '{scope}')")]
    Fetch {
        driver: String,
        scope: String,
        message: String,
    },

    /// The identity endpoint returned something that is not a token.
    #[error("{driver}: invalid token for scope '{scope}': {source}")]
    InvalidToken {
        driver: String,
        scope: String,
        #[source]
        source: TokenError,
    },

    /// No driver is registered under the requested name.
    #[error("driver [{driver}] is not supported")]
    UnsupportedDriver { driver: String },

    /// A client certificate could not be loaded.
    #[error("certificate error: {message}")]
    Certificate { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Error from a durable token store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error building a scope.
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),
}

impl CredentialError {
    /// Shorthand for a [`CredentialError::Fetch`].
    pub fn fetch(driver: impl Into<String>, scope: &Scope, message: impl Into<String>) -> Self {
        Self::Fetch {
            driver: driver.into(),
            scope: scope.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`CredentialError::InvalidToken`].
    pub fn invalid_token(driver: impl Into<String>, scope: &Scope, source: TokenError) -> Self {
        Self::InvalidToken {
            driver: driver.into(),
            scope: scope.to_string(),
            source,
        }
    }

    /// Shorthand for a [`CredentialError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The HTTP status returned by the identity endpoint, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Request { source, .. } => source.status(),
            _ => None,
        }
    }

    /// The structured error body returned by the identity endpoint, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Response { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

/// Error document returned by Microsoft identity endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderError {
    /// Short error code, e.g. `invalid_client`.
    #[serde(default)]
    pub error: Option<String>,

    /// Human readable explanation.
    #[serde(default)]
    pub error_description: Option<String>,

    /// Numeric AADSTS error codes.
    #[serde(default)]
    pub error_codes: Vec<i64>,

    #[serde(default)]
    pub trace_id: Option<String>,

    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl ProviderError {
    /// Parse an error body, if it looks like one.
    pub fn from_body(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        if parsed.error.is_none() && parsed.error_description.is_none() {
            return None;
        }
        Some(parsed)
    }

    /// The most descriptive message available.
    pub fn message(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.error.as_deref())
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.error_description) {
            (Some(code), Some(description)) => write!(f, "{}: {}", code, description),
            (Some(code), None) => write!(f, "{}", code),
            (None, Some(description)) => write!(f, "{}", description),
            (None, None) => write!(f, "unknown error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_from_body() {
        let body = r#"{
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided.",
            "error_codes": [7000215],
            "trace_id": "trace",
            "correlation_id": "correlation"
        }"#;

        let error = ProviderError::from_body(body).unwrap();
        assert_eq!(error.error.as_deref(), Some("invalid_client"));
        assert_eq!(error.error_codes, vec![7000215]);
        assert_eq!(
            error.message(),
            Some("AADSTS7000215: Invalid client secret provided.")
        );
    }

    #[test]
    fn test_provider_error_rejects_other_bodies() {
        assert!(ProviderError::from_body("<html>bad gateway</html>").is_none());
        assert!(ProviderError::from_body(r#"{"access_token": "x"}"#).is_none());
    }

    #[test]
    fn test_response_error_message() {
        let error = CredentialError::Response {
            driver: "secret".to_string(),
            scope: "https://vault.azure.net/.default".to_string(),
            status: StatusCode::UNAUTHORIZED,
            reason: "invalid client".to_string(),
            error: None,
        };

        let message = error.to_string();
        assert!(message.contains("secret"));
        assert!(message.contains("https://vault.azure.net/.default"));
        assert!(message.contains("401"));
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_driver_errors_name_driver_and_scope() {
        let fetch = CredentialError::fetch("cli", &Scope::key_vault(), "az login required");
        assert_eq!(
            fetch.to_string(),
            "cli: az login required (scope 'https://vault.azure.net/.default')"
        );

        let invalid = CredentialError::invalid_token(
            "secret",
            &Scope::key_vault(),
            TokenError::MissingField {
                field: "access_token".to_string(),
            },
        );
        let message = invalid.to_string();
        assert!(message.starts_with("secret: invalid token for scope 'https://vault.azure.net/.default'"));
        assert!(std::error::Error::source(&invalid).is_some());
    }

    #[test]
    fn test_unsupported_driver_message() {
        let error = CredentialError::UnsupportedDriver {
            driver: "kerberos".to_string(),
        };
        assert_eq!(error.to_string(), "driver [kerberos] is not supported");
    }
}
