//! Credential with an in-process cache in front of a durable token store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::TokenCredential;
use crate::config::DEFAULT_CACHE_PREFIX;
use crate::driver::CredentialDriver;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::store::TokenStore;
use crate::token::AccessToken;

/// Default safety margin before expiry within which cached tokens are
/// no longer handed out.
pub const DEFAULT_LEEWAY: Duration = Duration::minutes(1);

type FlightLock = Arc<tokio::sync::Mutex<()>>;

/// Two-tier token cache.
///
/// Lookups go to the in-process map first, then to the durable store, and
/// only then to the driver. A cached token is usable while its expiry minus
/// the leeway is still in the future; tokens without an expiry are always
/// usable.
///
/// Durable entries are stored under `{prefix}{scope cache key}` with a TTL of
/// the token's remaining lifetime minus the leeway, or the default TTL for
/// tokens without an expiry.
///
/// # Single flight
///
/// By default two callers missing the cache at once both call the driver.
/// [`with_single_flight`](Self::with_single_flight) serializes lookups per
/// scope so that only the first caller fetches.
pub struct CacheTokenCredential {
    driver: Arc<dyn CredentialDriver>,
    store: Arc<dyn TokenStore>,
    prefix: String,
    leeway: Duration,
    default_ttl: Option<Duration>,
    memory: Mutex<HashMap<String, AccessToken>>,
    flights: Option<Mutex<HashMap<String, FlightLock>>>,
}

impl CacheTokenCredential {
    pub fn new(driver: Arc<dyn CredentialDriver>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            driver,
            store,
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            leeway: DEFAULT_LEEWAY,
            default_ttl: None,
            memory: Mutex::new(HashMap::new()),
            flights: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Durable TTL for tokens that carry no expiry.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        self.store.clone()
    }

    /// Key of `scope` in the durable store.
    pub fn durable_key(&self, scope: &Scope) -> String {
        format!("{}{}", self.prefix, scope.cache_key())
    }

    fn is_fresh(&self, token: &AccessToken, now: DateTime<Utc>) -> bool {
        match token.expires_on() {
            Some(expires_on) => expires_on
                .checked_sub_signed(self.leeway)
                .is_some_and(|usable_until| usable_until > now),
            None => true,
        }
    }

    fn from_memory(&self, key: &str) -> Option<AccessToken> {
        let now = Utc::now();
        self.memory
            .lock()
            .get(key)
            .filter(|token| self.is_fresh(token, now))
            .cloned()
    }

    async fn from_store(&self, scope: &Scope) -> Result<Option<AccessToken>, CredentialError> {
        let durable_key = self.durable_key(scope);
        let Some(token) = self.store.get(&durable_key).await? else {
            tracing::debug!(key = %durable_key, "Durable cache miss");
            return Ok(None);
        };

        if !self.is_fresh(&token, Utc::now()) {
            tracing::debug!(key = %durable_key, "Durable cache entry within leeway of expiry");
            return Ok(None);
        }

        tracing::debug!(key = %durable_key, "Durable cache hit");
        self.memory.lock().insert(scope.cache_key(), token.clone());
        Ok(Some(token))
    }

    fn flight(&self, key: &str) -> Option<FlightLock> {
        self.flights
            .as_ref()
            .map(|flights| flights.lock().entry(key.to_string()).or_default().clone())
    }
}

impl std::fmt::Debug for CacheTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTokenCredential")
            .field("driver", &self.driver.name())
            .field("prefix", &self.prefix)
            .field("leeway", &self.leeway)
            .field("default_ttl", &self.default_ttl)
            .field("single_flight", &self.flights.is_some())
            .finish()
    }
}

#[async_trait]
impl TokenCredential for CacheTokenCredential {
    async fn token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        let key = scope.cache_key();

        if let Some(token) = self.from_memory(&key) {
            tracing::debug!(scope = %scope, "Using cached token");
            return Ok(token);
        }

        let _flight = match self.flight(&key) {
            Some(lock) => {
                let guard = lock.lock_owned().await;
                // Another caller may have filled the cache while we waited.
                if let Some(token) = self.from_memory(&key) {
                    return Ok(token);
                }
                Some(guard)
            }
            None => None,
        };

        if let Some(token) = self.from_store(scope).await? {
            return Ok(token);
        }

        self.refresh_token(scope, true).await
    }

    async fn refresh_token(&self, scope: &Scope, persist: bool) -> Result<AccessToken, CredentialError> {
        let token = self.driver.fetch_token(scope).await?;
        self.set_token(scope, token.clone(), persist).await?;
        Ok(token)
    }

    async fn forget_token(&self, scope: &Scope, durable: bool) -> Result<(), CredentialError> {
        self.memory.lock().remove(&scope.cache_key());

        if durable {
            self.store.forget(&self.durable_key(scope)).await?;
        }

        Ok(())
    }

    async fn set_token(&self, scope: &Scope, token: AccessToken, persist: bool) -> Result<(), CredentialError> {
        self.memory.lock().insert(scope.cache_key(), token.clone());

        if !persist {
            return Ok(());
        }

        let ttl = token.cache_lifetime(Some(self.leeway), self.default_ttl, Utc::now());
        if ttl <= Duration::zero() {
            tracing::debug!(scope = %scope, "Token too close to expiry to persist");
            return Ok(());
        }

        let durable_key = self.durable_key(scope);
        tracing::debug!(key = %durable_key, ttl_secs = ttl.num_seconds(), "Persisting token");
        self.store.set(&durable_key, &token, ttl).await?;
        Ok(())
    }

    fn driver(&self) -> Arc<dyn CredentialDriver> {
        self.driver.clone()
    }
}
