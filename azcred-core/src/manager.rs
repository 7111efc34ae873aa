//! Named credentials built from configuration.
//!
//! The [`CredentialManager`] turns a [`CredentialsConfig`] into
//! [`TokenCredential`]s on demand and keeps each one for the lifetime of the
//! manager, so repeated lookups share one token cache.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CredentialConfig, CredentialsConfig, DEFAULT_NAME, DriverConfig};
use crate::credential::{CacheTokenCredential, SimpleTokenCredential, TokenCredential};
use crate::driver::CredentialDriver;
use crate::error::CredentialError;
use crate::factory::DriverFactory;
use crate::scope::Scope;
use crate::store::{TokenStore, create_store};
use crate::token::AccessToken;

type DriverConstructor =
    dyn Fn(&DriverConfig) -> Result<Arc<dyn CredentialDriver>, CredentialError> + Send + Sync;

/// Registry of named credentials.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use azcred_core::{CredentialManager, CredentialsConfig, DriverFactory};
///
/// let manager = CredentialManager::new(CredentialsConfig::load()?, DriverFactory::default());
/// let token = manager.key_vault_token(None).await?;
/// println!("{}", token.authorization_header());
/// # Ok(())
/// # }
/// ```
pub struct CredentialManager {
    config: CredentialsConfig,
    factory: DriverFactory,
    extensions: Mutex<HashMap<String, Arc<DriverConstructor>>>,
    stores: Mutex<HashMap<String, Arc<dyn TokenStore>>>,
    credentials: Mutex<HashMap<String, Arc<dyn TokenCredential>>>,
}

impl CredentialManager {
    pub fn new(config: CredentialsConfig, factory: DriverFactory) -> Self {
        Self {
            config,
            factory,
            extensions: Mutex::new(HashMap::new()),
            stores: Mutex::new(HashMap::new()),
            credentials: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CredentialsConfig {
        &self.config
    }

    pub fn factory(&self) -> &DriverFactory {
        &self.factory
    }

    /// Name of the credential used when none is given.
    pub fn default_credential(&self) -> &str {
        let name = self.config.credential.trim();
        if name.is_empty() { DEFAULT_NAME } else { name }
    }

    /// Names of all configured credentials, sorted.
    pub fn credential_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.credentials.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the credential `name`, or the default credential.
    ///
    /// The credential is built on first use and reused afterwards, even if
    /// the configuration it was built from has since changed.
    pub fn credential(&self, name: Option<&str>) -> Result<Arc<dyn TokenCredential>, CredentialError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.default_credential())
            .to_string();

        let mut credentials = self.credentials.lock();
        if let Some(credential) = credentials.get(&name) {
            return Ok(credential.clone());
        }

        let config = self.config.credential_config(&name).ok_or_else(|| {
            CredentialError::config(format!("credential [{}] is not configured", name))
        })?;

        let credential = self.create_credential(&name, config)?;
        credentials.insert(name, credential.clone());
        Ok(credential)
    }

    /// Register a driver constructor under `driver`.
    ///
    /// Registered constructors take precedence over the built-in drivers of
    /// the same name. Credentials already built are not affected.
    pub fn extend<F>(&self, driver: impl Into<String>, constructor: F)
    where
        F: Fn(&DriverConfig) -> Result<Arc<dyn CredentialDriver>, CredentialError> + Send + Sync + 'static,
    {
        self.extensions.lock().insert(driver.into(), Arc::new(constructor));
    }

    /// Use `store` for every credential whose cache names `name`.
    pub fn register_store(&self, name: impl Into<String>, store: Arc<dyn TokenStore>) {
        self.stores.lock().insert(name.into(), store);
    }

    /// Create a driver for `config`.
    ///
    /// The driver is the one `config` names, or else the process-wide
    /// driver. Registered constructors are checked before the built-ins.
    pub fn create_driver(&self, config: &DriverConfig) -> Result<Arc<dyn CredentialDriver>, CredentialError> {
        let name = config
            .driver
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| {
                let global = self.config.driver.trim();
                if global.is_empty() { DEFAULT_NAME } else { global }
            });

        let extension = self.extensions.lock().get(name).cloned();
        if let Some(constructor) = extension {
            tracing::debug!(driver = name, "Creating credential driver from extension");
            return constructor(config);
        }

        self.factory.create_named(name, config)
    }

    /// Build a fresh credential named `name` from `config`.
    ///
    /// Credentials with caching enabled get a [`CacheTokenCredential`] over
    /// the configured store; the others a [`SimpleTokenCredential`].
    pub fn create_credential(
        &self,
        name: &str,
        config: &CredentialConfig,
    ) -> Result<Arc<dyn TokenCredential>, CredentialError> {
        let driver = self.create_driver(&config.options)?;
        let cache = config.cache.resolve(&self.config.cache);

        if !cache.enabled {
            tracing::info!(credential = name, driver = driver.name(), "Created credential");
            return Ok(Arc::new(SimpleTokenCredential::new(driver)));
        }

        let store = self.store(&cache.store)?;
        tracing::info!(
            credential = name,
            driver = driver.name(),
            store = %cache.store,
            prefix = %cache.prefix,
            "Created cached credential"
        );

        Ok(Arc::new(
            CacheTokenCredential::new(driver, store)
                .with_prefix(cache.prefix)
                .with_leeway(cache.leeway)
                .with_default_ttl(cache.ttl)
                .with_single_flight(cache.single_flight),
        ))
    }

    fn store(&self, name: &str) -> Result<Arc<dyn TokenStore>, CredentialError> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }

        let store = create_store(name, None)?;
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Get a token for `scope` from the credential `name`.
    pub async fn token(&self, scope: &Scope, name: Option<&str>) -> Result<AccessToken, CredentialError> {
        self.credential(name)?.token(scope).await
    }

    /// Fetch a new token for `scope` from the credential `name`.
    pub async fn refresh_token(
        &self,
        scope: &Scope,
        name: Option<&str>,
        persist: bool,
    ) -> Result<AccessToken, CredentialError> {
        self.credential(name)?.refresh_token(scope, persist).await
    }

    /// Drop the cached token for `scope` from the credential `name`.
    pub async fn forget_token(&self, scope: &Scope, name: Option<&str>, durable: bool) -> Result<(), CredentialError> {
        self.credential(name)?.forget_token(scope, durable).await
    }

    /// Driver of the credential `name`.
    pub fn driver(&self, name: Option<&str>) -> Result<Arc<dyn CredentialDriver>, CredentialError> {
        Ok(self.credential(name)?.driver())
    }

    pub async fn key_vault_token(&self, name: Option<&str>) -> Result<AccessToken, CredentialError> {
        self.token(&Scope::key_vault(), name).await
    }

    pub async fn storage_account_token(&self, name: Option<&str>) -> Result<AccessToken, CredentialError> {
        self.token(&Scope::storage_account(), name).await
    }

    pub async fn web_pub_sub_token(&self, name: Option<&str>) -> Result<AccessToken, CredentialError> {
        self.token(&Scope::web_pub_sub(), name).await
    }

    pub async fn microsoft_graph_token(&self, name: Option<&str>) -> Result<AccessToken, CredentialError> {
        self.token(&Scope::microsoft_graph(), name).await
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("default_credential", &self.default_credential())
            .field("credentials", &self.credential_names())
            .field("extensions", &self.extensions.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
