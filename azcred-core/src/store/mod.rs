//! Durable token storage.
//!
//! This module provides:
//! - [`TokenStore`] - Trait for key/value token stores with per-entry TTL
//! - [`MemoryTokenStore`] - In-process implementation, mostly for tests
//! - [`FileTokenStore`] - JSON file in the user's cache directory
//! - [`KeyringTokenStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to build a backend by name
//!
//! # Storage Key Convention
//!
//! Keys follow the pattern: `{prefix}{scope cache key}`, where the prefix
//! defaults to `azure_credentials:token:`. Credentials sharing a store and a
//! prefix share entries.
//!
//! # Example
//!
//! ```rust,ignore
//! use azcred_core::store::{TokenStore, create_store};
//! use azcred_core::AccessToken;
//!
//! let store = create_store("memory", None)?;
//!
//! let token = AccessToken::new("eyJ0eXAi...");
//! store.set("azure_credentials:token:vault.azure.net", &token, chrono::Duration::minutes(5)).await?;
//!
//! let cached = store.get("azure_credentials:token:vault.azure.net").await?;
//! assert_eq!(cached.unwrap().expose(), "eyJ0eXAi...");
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::token::AccessToken;

mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use file::FileTokenStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringTokenStore;
pub use memory::MemoryTokenStore;

/// Error type for token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error reading or writing a store file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// No platform cache directory could be determined.
    #[error("cache directory not available")]
    CacheDirUnavailable,

    /// No backend is registered under the requested name.
    #[error("unknown token store '{name}'")]
    UnknownStore { name: String },
}

/// Key/value store for access tokens with per-entry time-to-live.
///
/// Entries are never returned after their TTL has elapsed.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Retrieve a token by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or its TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Store a token at the given key for `ttl`.
    ///
    /// Overwrites any existing value. A non-positive TTL removes the entry.
    async fn set(&self, key: &str, token: &AccessToken, ttl: Duration) -> Result<(), StoreError>;

    /// Delete a token by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn forget(&self, key: &str) -> Result<(), StoreError>;

    /// Check if a live entry exists without handing out the token.
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// A token together with the instant its store entry lapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredToken {
    pub token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(token: &AccessToken, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            token: token.clone(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Create a token store by backend name.
///
/// # Backends
///
/// - `memory` - [`MemoryTokenStore`], lost when the process exits
/// - `file` - [`FileTokenStore`] at `path`, or `tokens.json` in the user's cache directory
/// - `keyring` - [`KeyringTokenStore`]; falls back to memory with a warning if
///   the keyring is unavailable or the `keyring-store` feature is disabled
///
/// Any other name is an error.
pub fn create_store(name: &str, path: Option<PathBuf>) -> Result<Arc<dyn TokenStore>, StoreError> {
    match name {
        "memory" | "array" => {
            tracing::debug!("Using in-memory token storage");
            Ok(Arc::new(MemoryTokenStore::new()))
        }
        "file" => {
            let path = match path {
                Some(path) => path,
                None => FileTokenStore::default_path()?,
            };
            tracing::debug!(path = %path.display(), "Using file token storage");
            Ok(Arc::new(FileTokenStore::load_from_path(path)?))
        }
        "keyring" => Ok(keyring_or_memory()),
        other => Err(StoreError::UnknownStore {
            name: other.to_string(),
        }),
    }
}

#[cfg(feature = "keyring-store")]
fn keyring_or_memory() -> Arc<dyn TokenStore> {
    match KeyringTokenStore::try_new("azcred") {
        Ok(store) => {
            tracing::info!("Using OS keyring for token storage");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "Keyring unavailable ({}), falling back to memory store. \
                 Tokens will not persist across restarts.",
                e
            );
            Arc::new(MemoryTokenStore::new())
        }
    }
}

#[cfg(not(feature = "keyring-store"))]
fn keyring_or_memory() -> Arc<dyn TokenStore> {
    tracing::warn!(
        "Keyring storage requested but keyring-store feature not enabled. \
         Using memory store. Tokens will not persist across restarts."
    );
    Arc::new(MemoryTokenStore::new())
}
