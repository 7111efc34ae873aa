//! Credential with an in-process cache only.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::TokenCredential;
use crate::driver::CredentialDriver;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

/// Keeps fetched tokens in memory until they expire.
///
/// # Thread Safety
///
/// The cache is behind a mutex that is never held across a fetch. Two
/// callers missing the cache at once both call the driver; the last result
/// wins.
pub struct SimpleTokenCredential {
    driver: Arc<dyn CredentialDriver>,
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl SimpleTokenCredential {
    pub fn new(driver: Arc<dyn CredentialDriver>) -> Self {
        Self {
            driver,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &str) -> Option<AccessToken> {
        self.tokens
            .lock()
            .get(key)
            .filter(|token| !token.is_expired())
            .cloned()
    }
}

impl std::fmt::Debug for SimpleTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleTokenCredential")
            .field("driver", &self.driver.name())
            .field("cached", &self.tokens.lock().len())
            .finish()
    }
}

#[async_trait]
impl TokenCredential for SimpleTokenCredential {
    async fn token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cached(&scope.cache_key()) {
            tracing::debug!(scope = %scope, "Using cached token");
            return Ok(token);
        }

        self.refresh_token(scope, true).await
    }

    async fn refresh_token(&self, scope: &Scope, persist: bool) -> Result<AccessToken, CredentialError> {
        let token = self.driver.fetch_token(scope).await?;
        self.set_token(scope, token.clone(), persist).await?;
        Ok(token)
    }

    async fn forget_token(&self, scope: &Scope, _durable: bool) -> Result<(), CredentialError> {
        self.tokens.lock().remove(&scope.cache_key());
        Ok(())
    }

    async fn set_token(&self, scope: &Scope, token: AccessToken, _persist: bool) -> Result<(), CredentialError> {
        self.tokens.lock().insert(scope.cache_key(), token);
        Ok(())
    }

    fn driver(&self) -> Arc<dyn CredentialDriver> {
        self.driver.clone()
    }
}
