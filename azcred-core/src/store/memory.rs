//! In-memory token storage implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{StoreError, StoredToken, TokenStore};
use crate::token::AccessToken;

/// In-memory token store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryTokenStore {
    data: RwLock<HashMap<String, StoredToken>>,
}

impl MemoryTokenStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries held, including lapsed ones not yet pruned.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenStore")
            .field("keys_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<AccessToken>, StoreError> {
        let data = self.data.read().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        let now = Utc::now();
        Ok(data
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.token.clone()))
    }

    async fn set(&self, key: &str, token: &AccessToken, ttl: Duration) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        let now = Utc::now();
        data.retain(|_, stored| stored.is_live(now));

        if ttl <= Duration::zero() {
            data.remove(key);
        } else {
            data.insert(key.to_string(), StoredToken::new(token, ttl, now));
        }
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        data.remove(key);
        Ok(())
    }
}
