//! # azcred Core
//!
//! Token acquisition and caching for Azure identity credentials.
//!
//! This crate provides:
//! - Normalized scopes and access tokens with expiry and JWT claim helpers
//! - Credential drivers for the Azure CLI, managed identity, client secrets,
//!   client certificates and the password grant
//! - Token credentials caching tokens in memory and in a durable store
//! - A configuration-driven manager of named credentials
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azcred_core::{CredentialManager, CredentialsConfig, DriverFactory, Scope};
//!
//! async fn get_token() -> Result<String, Box<dyn std::error::Error>> {
//!     let manager = CredentialManager::new(CredentialsConfig::load()?, DriverFactory::default());
//!     let token = manager.token(&Scope::key_vault(), None).await?;
//!     Ok(token.authorization_header())
//! }
//! ```

pub mod certificate;
pub mod config;
pub mod credential;
pub mod driver;
pub mod error;
pub mod factory;
pub mod manager;
pub mod scope;
pub mod secret;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use scope::{
    Scope,
    ScopeError,
};

pub use secret::Secret;

pub use token::{
    AccessToken,
    TokenError,
};

pub use error::{
    CredentialError,
    ProviderError,
};

pub use certificate::{
    ClientCertificate,
    PemClientCertificate,
};

pub use driver::{
    AzureCliDriver,
    ClientCertificateDriver,
    ClientSecretDriver,
    ClosureDriver,
    CredentialDriver,
    ManagedIdentityDriver,
    ManagedIdentityId,
    PasswordDriver,
};

pub use factory::{
    DriverFactory,
    DriverKind,
};

pub use credential::{
    CacheTokenCredential,
    SimpleTokenCredential,
    TokenCredential,
};

pub use store::{
    TokenStore,
    StoreError,
    MemoryTokenStore,
    FileTokenStore,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringTokenStore;

pub use config::{
    CacheConfig,
    ConfigError,
    CredentialConfig,
    CredentialsConfig,
    DriverConfig,
};

pub use manager::CredentialManager;
