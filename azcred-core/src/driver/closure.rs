//! Drivers backed by a plain function.

use async_trait::async_trait;
use std::collections::HashMap;

use super::CredentialDriver;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

type FetchFn = dyn Fn(&Scope) -> Result<Option<AccessToken>, String> + Send + Sync;

/// A driver that asks a function for tokens.
///
/// The function answers `Ok(None)` when it has no token for the scope and
/// `Err(message)` when it fails; both surface as [`CredentialError::Fetch`].
pub struct ClosureDriver {
    name: String,
    fetch: Box<FetchFn>,
}

impl ClosureDriver {
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn(&Scope) -> Result<Option<AccessToken>, String> + Send + Sync + 'static,
    {
        Self {
            name: "closure".to_string(),
            fetch: Box::new(fetch),
        }
    }

    /// A driver that always returns `token`.
    pub fn constant(token: AccessToken) -> Self {
        Self::new(move |_| Ok(Some(token.clone()))).with_name("constant")
    }

    /// A driver that always fails.
    pub fn empty() -> Self {
        Self::new(|_| Err("Empty Credential Driver".to_string())).with_name("empty")
    }

    /// A driver that looks tokens up by [`Scope::cache_key`].
    pub fn from_map(tokens: HashMap<String, AccessToken>) -> Self {
        Self::new(move |scope| Ok(tokens.get(&scope.cache_key()).cloned())).with_name("map")
    }

    /// Rename the driver.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl std::fmt::Debug for ClosureDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureDriver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialDriver for ClosureDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        match (self.fetch)(scope) {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(CredentialError::fetch(&self.name, scope, "closure responded null")),
            Err(message) => Err(CredentialError::fetch(&self.name, scope, message)),
        }
    }
}
