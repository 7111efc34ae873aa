//! File-backed token storage.
//!
//! Tokens are kept in a single JSON document in the platform cache
//! directory:
//!
//! - Linux: `~/.cache/azcred/tokens.json`
//! - macOS: `~/Library/Caches/com.raibid-labs.azcred/tokens.json`
//! - Windows: `%LOCALAPPDATA%\raibid-labs\azcred\cache\tokens.json`
//!
//! The document is re-read before every operation and replaced atomically
//! on every change, so several processes can share one file. Concurrent
//! writers of the same key resolve last-write-wins. Lapsed entries are
//! dropped whenever the document is written.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{StoreError, StoredToken, TokenStore};
use crate::token::AccessToken;

/// Internal storage format for the token file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFileData {
    /// Version of the file format (for future migrations).
    version: u32,

    /// Entries keyed by cache key.
    entries: HashMap<String, StoredToken>,
}

impl Default for TokenFileData {
    fn default() -> Self {
        Self {
            version: 1,
            entries: HashMap::new(),
        }
    }
}

/// Disk-backed token store.
///
/// # Thread Safety
///
/// Operations on one instance are serialized by a mutex, and the file is
/// replaced by rename so readers never see a partial document. Instances in
/// other processes are not locked out; the last writer of a key wins.
pub struct FileTokenStore {
    /// Path to the tokens JSON file.
    path: PathBuf,

    /// Held across each read-modify-write.
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Get the default storage path for tokens.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "azcred")
            .ok_or(StoreError::CacheDirUnavailable)?;

        Ok(dirs.cache_dir().join("tokens.json"))
    }

    /// Load the token store from the default location.
    pub fn load() -> Result<Self, StoreError> {
        let path = Self::default_path()?;
        Self::load_from_path(path)
    }

    /// Load the token store from a specific path.
    ///
    /// Creates parent directories if they don't exist and checks that an
    /// existing file parses. The file itself is only created on the first
    /// write.
    pub fn load_from_path(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        store.read()?;
        Ok(store)
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<TokenFileData, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TokenFileData::default()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(TokenFileData::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, data: &TokenFileData) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(data)?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tokens.json".to_string());
        let temp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        fs::write(&temp, contents)?;
        let renamed = restrict_permissions(&temp)
            .and_then(|()| fs::rename(&temp, &self.path).map_err(StoreError::from));
        if renamed.is_err() {
            let _ = fs::remove_file(&temp);
        }
        renamed
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

impl std::fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> Result<Option<AccessToken>, StoreError> {
        let _guard = self.lock.lock();
        let data = self.read()?;
        let now = Utc::now();
        Ok(data
            .entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.token.clone()))
    }

    async fn set(&self, key: &str, token: &AccessToken, ttl: Duration) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.read()?;
        let now = Utc::now();
        data.entries.retain(|_, stored| stored.is_live(now));

        if ttl <= Duration::zero() {
            data.entries.remove(key);
        } else {
            data.entries
                .insert(key.to_string(), StoredToken::new(token, ttl, now));
        }

        self.save(&data)
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut data = self.read()?;

        if data.entries.remove(key).is_none() {
            return Ok(());
        }

        self.save(&data)
    }
}
