//! Token credentials.
//!
//! A [`TokenCredential`] wraps a [`CredentialDriver`] and caches what it
//! returns:
//!
//! - [`SimpleTokenCredential`] - in-process map only
//! - [`CacheTokenCredential`] - in-process map in front of a durable [`TokenStore`](crate::store::TokenStore)
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), azcred_core::CredentialError> {
//! use std::sync::Arc;
//! use azcred_core::{AzureCliDriver, Scope, SimpleTokenCredential, TokenCredential};
//!
//! let credential = SimpleTokenCredential::new(Arc::new(AzureCliDriver::default()));
//!
//! let token = credential.token(&Scope::key_vault()).await?;
//! println!("Authorization: {}", token.authorization_header());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::driver::CredentialDriver;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

mod cache;
mod simple;

pub use cache::{CacheTokenCredential, DEFAULT_LEEWAY};
pub use simple::SimpleTokenCredential;

/// A source of access tokens that reuses tokens while they are valid.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get a valid token for `scope`, fetching one only when no cached
    /// token can be used.
    async fn token(&self, scope: &Scope) -> Result<AccessToken, CredentialError>;

    /// Fetch a new token for `scope` and cache it.
    ///
    /// With `persist`, the token is also written to the durable cache, if
    /// the credential has one.
    async fn refresh_token(&self, scope: &Scope, persist: bool) -> Result<AccessToken, CredentialError>;

    /// Drop the cached token for `scope`.
    ///
    /// With `durable`, the durable cache entry is removed as well.
    async fn forget_token(&self, scope: &Scope, durable: bool) -> Result<(), CredentialError>;

    /// Cache `token` for `scope` as if it had been fetched.
    async fn set_token(&self, scope: &Scope, token: AccessToken, persist: bool) -> Result<(), CredentialError>;

    /// The driver fetching tokens for this credential.
    fn driver(&self) -> Arc<dyn CredentialDriver>;
}
