//! Credential drivers.
//!
//! A [`CredentialDriver`] knows how to obtain a fresh [`AccessToken`] for a
//! [`Scope`] through one authentication mechanism. Drivers never cache;
//! caching is the job of the [token credentials](crate::credential).
//!
//! This module provides:
//! - [`AzureCliDriver`] - Asks a locally logged-in `az` CLI
//! - [`ManagedIdentityDriver`] - App Service / Functions managed identity endpoint
//! - [`ClientSecretDriver`] - OAuth client credentials grant with a client secret
//! - [`ClientCertificateDriver`] - Client credentials grant with a signed client assertion
//! - [`PasswordDriver`] - OAuth resource owner password grant
//! - [`ClosureDriver`] - Constant, empty and table drivers for tests and composition

use async_trait::async_trait;

use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

mod cli;
mod client_certificate;
mod client_secret;
mod closure;
mod managed_identity;
mod oauth;
mod password;
pub mod request;

pub use cli::AzureCliDriver;
pub use client_certificate::{ClientCertificateDriver, DEFAULT_ASSERTION_LIFETIME};
pub use client_secret::ClientSecretDriver;
pub use closure::ClosureDriver;
pub use managed_identity::{ManagedIdentityDriver, ManagedIdentityId, APP_SERVICE_API_VERSION};
pub use oauth::{OAuthGrant, microsoft_login_token_endpoint};
pub use password::PasswordDriver;

/// A mechanism that fetches access tokens from an identity provider.
#[async_trait]
pub trait CredentialDriver: Send + Sync {
    /// Short name of the mechanism, used in errors and logs.
    fn name(&self) -> &str;

    /// Fetch a new token for `scope`.
    ///
    /// Transport failures are reported as [`CredentialError::Request`],
    /// rejections by the identity provider as [`CredentialError::Response`]
    /// and anything else as [`CredentialError::Fetch`].
    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError>;
}

impl std::fmt::Debug for dyn CredentialDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDriver")
            .field("name", &self.name())
            .finish()
    }
}
