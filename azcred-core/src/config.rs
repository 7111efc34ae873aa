//! Credential configuration.
//!
//! Configuration is read from `credentials.toml` in the platform config
//! directory (`~/.config/azcred/credentials.toml` on Linux). Without a file,
//! or when the file names no credentials, a `default` credential is built
//! from the standard Azure environment variables.
//!
//! ```toml
//! credential = "default"
//!
//! [cache]
//! store = "file"
//! ttl = 3600
//! ttl_leeway = 60
//!
//! [credentials.default]
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! client_secret = "..."
//!
//! [credentials.default.cache]
//! enabled = true
//! ```

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::secret::Secret;

/// Default prefix of durable cache keys.
pub const DEFAULT_CACHE_PREFIX: &str = "azure_credentials:token:";

/// Default durable cache lifetime, in seconds, of tokens without an expiry.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default leeway, in seconds, before expiry at which cached tokens are refreshed.
pub const DEFAULT_CACHE_LEEWAY_SECS: u64 = 60;

/// Default durable store backend.
pub const DEFAULT_CACHE_STORE: &str = "memory";

/// Longest cache TTL or leeway, in seconds; larger values are capped.
pub const MAX_CACHE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Name used for the default credential and for driver inference.
pub const DEFAULT_NAME: &str = "default";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid.
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No platform configuration directory could be determined.
    #[error("configuration directory not available")]
    DirUnavailable,
}

/// Cache settings, both process-wide and per credential.
///
/// Unset per-credential values fall back to the process-wide ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether tokens are kept in a durable store.
    pub enabled: Option<bool>,

    /// Store backend name.
    pub store: Option<String>,

    /// Prefix of durable cache keys.
    pub prefix: Option<String>,

    /// Cache lifetime in seconds of tokens without an expiry.
    pub ttl: Option<u64>,

    /// Seconds before expiry at which a cached token is considered stale.
    pub ttl_leeway: Option<u64>,

    /// Serialize refreshes of the same scope within one process.
    pub single_flight: Option<bool>,
}

/// Cache settings with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCache {
    pub enabled: bool,
    pub store: String,
    pub prefix: String,
    pub ttl: Duration,
    pub leeway: Duration,
    pub single_flight: bool,
}

impl CacheConfig {
    /// Layer these settings over `global`.
    ///
    /// TTL and leeway are capped at [`MAX_CACHE_SECS`].
    pub fn resolve(&self, global: &CacheConfig) -> ResolvedCache {
        let prefix = non_blank(&self.prefix)
            .or(non_blank(&global.prefix))
            .unwrap_or(DEFAULT_CACHE_PREFIX)
            .to_string();

        let seconds = |own: Option<u64>, global: Option<u64>, default: u64| {
            let secs = own.or(global).unwrap_or(default).min(MAX_CACHE_SECS);
            Duration::seconds(secs as i64)
        };

        ResolvedCache {
            enabled: self.enabled.or(global.enabled).unwrap_or(false),
            store: non_blank(&self.store)
                .or(non_blank(&global.store))
                .unwrap_or(DEFAULT_CACHE_STORE)
                .to_string(),
            prefix,
            ttl: seconds(self.ttl, global.ttl, DEFAULT_CACHE_TTL_SECS),
            leeway: seconds(self.ttl_leeway, global.ttl_leeway, DEFAULT_CACHE_LEEWAY_SECS),
            single_flight: self.single_flight.or(global.single_flight).unwrap_or(false),
        }
    }
}

/// Settings used to build a credential driver.
///
/// Which fields matter depends on the driver; see
/// [`infer_driver`](crate::factory::infer_driver) for how the driver is
/// picked when none is named.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver name; absent or `default` means infer from the other fields.
    pub driver: Option<String>,

    pub tenant_id: Option<String>,

    /// Token endpoint overriding the one derived from `tenant_id`.
    pub token_endpoint: Option<String>,

    pub client_id: Option<String>,

    pub client_secret: Option<Secret>,

    pub username: Option<String>,

    pub password: Option<Secret>,

    /// Inline PEM bundle with certificate and private key.
    pub client_certificate: Option<Secret>,

    /// Path of a PEM bundle with certificate and private key.
    #[serde(alias = "client_certificate_path")]
    pub client_certificate_file: Option<PathBuf>,

    pub client_certificate_password: Option<Secret>,

    /// Lifetime of client assertions in seconds.
    pub client_assertion_ttl: Option<u64>,

    pub identity_endpoint: Option<String>,

    pub identity_header: Option<Secret>,

    /// Resource id of a user-assigned managed identity.
    pub resource_id: Option<String>,

    /// Principal id of a user-assigned managed identity.
    pub principal_id: Option<String>,

    pub subscription_id: Option<String>,

    /// Path of the `az` executable.
    pub az_path: Option<String>,

    /// Fixed token of the `constant` driver.
    pub access_token: Option<Secret>,

    /// Token type of the `constant` driver.
    pub token_type: Option<String>,
}

impl DriverConfig {
    /// Read driver settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_vars(|name| std::env::var(name).ok())
    }

    /// Read driver settings through `lookup`. Blank values are ignored.
    pub fn from_env_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        Self {
            driver: var(&["AZURE_CREDENTIAL_DRIVER"]),
            tenant_id: var(&["AZURE_TENANT_ID"]),
            token_endpoint: var(&["AZURE_TOKEN_ENDPOINT"]),
            client_id: var(&["AZURE_CLIENT_ID"]),
            client_secret: var(&["AZURE_CLIENT_SECRET"]).map(Secret::from),
            username: var(&["AZURE_USERNAME"]),
            password: var(&["AZURE_PASSWORD"]).map(Secret::from),
            client_certificate: var(&["AZURE_CLIENT_CERTIFICATE"]).map(Secret::from),
            client_certificate_file: var(&["AZURE_CLIENT_CERTIFICATE_PATH"]).map(PathBuf::from),
            client_certificate_password: var(&["AZURE_CLIENT_CERTIFICATE_PASSWORD"])
                .map(Secret::from),
            client_assertion_ttl: None,
            identity_endpoint: var(&["IDENTITY_ENDPOINT", "MSI_ENDPOINT"]),
            identity_header: var(&["IDENTITY_HEADER"]).map(Secret::from),
            resource_id: var(&["AZURE_RESOURCE_ID"]),
            principal_id: None,
            subscription_id: var(&["AZURE_SUBSCRIPTION_ID"]),
            az_path: var(&["AZ_PATH", "AZURE_CLI_PATH"]),
            access_token: None,
            token_type: None,
        }
    }
}

/// Configuration of one named credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(flatten)]
    pub options: DriverConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl CredentialConfig {
    pub fn new(options: DriverConfig) -> Self {
        Self {
            options,
            cache: CacheConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Name of the credential used when none is given.
    pub credential: String,

    /// Driver used by credentials that name none.
    pub driver: String,

    /// Process-wide cache defaults.
    pub cache: CacheConfig,

    /// Named credentials.
    pub credentials: HashMap<String, CredentialConfig>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            credential: DEFAULT_NAME.to_string(),
            driver: DEFAULT_NAME.to_string(),
            cache: CacheConfig::default(),
            credentials: HashMap::new(),
            config_path: None,
        }
    }
}

impl CredentialsConfig {
    /// Get the default configuration file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = project_dirs().ok_or(ConfigError::DirUnavailable)?;
        Ok(dirs.config_dir().join("credentials.toml"))
    }

    /// Load configuration from the default location, or from the
    /// environment if there is no configuration file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using environment");
            Ok(Self::from_env())
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());

        Ok(config.with_env_defaults(|name| std::env::var(name).ok()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Configuration holding only a `default` credential read from the
    /// process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_defaults(|name| std::env::var(name).ok())
    }

    /// Fill in what the configuration leaves open from `lookup`.
    ///
    /// - the `default` credential, when no credential is configured at all
    /// - the process-wide cache store, prefix, TTL and leeway from the
    ///   `AZURE_CREDENTIALS_CACHE_*` variables, when not set in the file
    pub fn with_env_defaults<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.credentials.is_empty() {
            self.credentials.insert(
                DEFAULT_NAME.to_string(),
                CredentialConfig::new(DriverConfig::from_env_vars(&lookup)),
            );
        }

        self.cache.store = self.cache.store.or_else(|| var("AZURE_CREDENTIALS_CACHE_STORE"));
        self.cache.prefix = self.cache.prefix.or_else(|| var("AZURE_CREDENTIALS_CACHE_PREFIX"));
        self.cache.ttl = self
            .cache
            .ttl
            .or_else(|| var("AZURE_CREDENTIALS_CACHE_TTL").and_then(|v| v.trim().parse().ok()));
        self.cache.ttl_leeway = self
            .cache
            .ttl_leeway
            .or_else(|| var("AZURE_CREDENTIALS_CACHE_LEEWAY").and_then(|v| v.trim().parse().ok()));

        self
    }

    /// Settings of the credential `name`.
    pub fn credential_config(&self, name: &str) -> Option<&CredentialConfig> {
        self.credentials.get(name)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "azcred")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_parse_full_file() {
        let config = CredentialsConfig::from_toml_str(
            r#"
            credential = "app"
            driver = "cli"

            [cache]
            store = "file"
            ttl = 1800

            [credentials.app]
            driver = "secret"
            tenant_id = "tenant"
            client_id = "client"
            client_secret = "s3cr3t"

            [credentials.app.cache]
            enabled = true
            ttl_leeway = 120

            [credentials.cert]
            client_id = "client"
            token_endpoint = "https://example.test/token"
            client_certificate_path = "/etc/azcred/cert.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.credential, "app");
        assert_eq!(config.driver, "cli");
        assert_eq!(config.cache.ttl, Some(1800));

        let app = config.credential_config("app").unwrap();
        assert_eq!(app.options.driver.as_deref(), Some("secret"));
        assert_eq!(app.options.client_secret.as_ref().unwrap().expose(), "s3cr3t");
        assert_eq!(app.cache.enabled, Some(true));
        assert_eq!(app.cache.ttl_leeway, Some(120));

        let cert = config.credential_config("cert").unwrap();
        assert_eq!(
            cert.options.client_certificate_file.as_deref(),
            Some(Path::new("/etc/azcred/cert.pem"))
        );
    }

    #[test]
    fn test_defaults() {
        let config = CredentialsConfig::from_toml_str("").unwrap();
        assert_eq!(config.credential, "default");
        assert_eq!(config.driver, "default");
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = CredentialsConfig::from_toml_str(
            r#"
            [credentials.default]
            client_secret = "super-secret-value"
            "#,
        )
        .unwrap();
        assert!(!format!("{:?}", config).contains("super-secret-value"));
    }

    #[test]
    fn test_cache_resolution_defaults() {
        let resolved = CacheConfig::default().resolve(&CacheConfig::default());
        assert_eq!(
            resolved,
            ResolvedCache {
                enabled: false,
                store: "memory".to_string(),
                prefix: "azure_credentials:token:".to_string(),
                ttl: Duration::hours(1),
                leeway: Duration::minutes(1),
                single_flight: false,
            }
        );
    }

    #[test]
    fn test_cache_resolution_layers_over_global() {
        let global = CacheConfig {
            enabled: Some(true),
            store: Some("file".to_string()),
            prefix: Some("tokens:".to_string()),
            ttl: Some(600),
            ttl_leeway: Some(30),
            single_flight: None,
        };
        let own = CacheConfig {
            ttl_leeway: Some(90),
            store: Some("  ".to_string()),
            ..Default::default()
        };

        let resolved = own.resolve(&global);
        assert!(resolved.enabled);
        assert_eq!(resolved.store, "file");
        assert_eq!(resolved.prefix, "tokens:");
        assert_eq!(resolved.ttl, Duration::minutes(10));
        assert_eq!(resolved.leeway, Duration::seconds(90));

        let own = CacheConfig {
            prefix: Some("custom:".to_string()),
            enabled: Some(false),
            ..Default::default()
        };
        let resolved = own.resolve(&global);
        assert_eq!(resolved.prefix, "custom:");
        assert!(!resolved.enabled);
    }

    #[test]
    fn test_cache_resolution_caps_huge_durations() {
        let global = CacheConfig {
            ttl: Some(u64::MAX),
            ttl_leeway: Some(9_223_372_036_854_775_807),
            ..Default::default()
        };

        let resolved = CacheConfig::default().resolve(&global);
        let cap = Duration::seconds(MAX_CACHE_SECS as i64);
        assert_eq!(resolved.ttl, cap);
        assert_eq!(resolved.leeway, cap);
        assert!(Utc::now().checked_add_signed(resolved.ttl).is_some());
    }

    #[test]
    fn test_driver_config_from_env_vars() {
        let config = DriverConfig::from_env_vars(env(&[
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
            ("MSI_ENDPOINT", "http://localhost/msi"),
            ("AZURE_CLI_PATH", "/usr/bin/az"),
            ("AZURE_USERNAME", "   "),
        ]));

        assert_eq!(config.tenant_id.as_deref(), Some("tenant"));
        assert_eq!(config.client_id.as_deref(), Some("client"));
        assert_eq!(config.client_secret.unwrap().expose(), "secret");
        assert_eq!(config.identity_endpoint.as_deref(), Some("http://localhost/msi"));
        assert_eq!(config.az_path.as_deref(), Some("/usr/bin/az"));
        assert_eq!(config.username, None);
    }

    #[test]
    fn test_identity_endpoint_prefers_identity_endpoint() {
        let config = DriverConfig::from_env_vars(env(&[
            ("IDENTITY_ENDPOINT", "http://new"),
            ("MSI_ENDPOINT", "http://old"),
        ]));
        assert_eq!(config.identity_endpoint.as_deref(), Some("http://new"));
    }

    #[test]
    fn test_env_defaults_fill_missing_credentials_only() {
        let config = CredentialsConfig::default().with_env_defaults(env(&[
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CREDENTIALS_CACHE_TTL", "120"),
            ("AZURE_CREDENTIALS_CACHE_STORE", "file"),
        ]));

        let default = config.credential_config("default").unwrap();
        assert_eq!(default.options.client_id.as_deref(), Some("client"));
        assert_eq!(config.cache.ttl, Some(120));
        assert_eq!(config.cache.store.as_deref(), Some("file"));

        let config = CredentialsConfig::from_toml_str(
            r#"
            [cache]
            ttl = 10

            [credentials.app]
            driver = "cli"
            "#,
        )
        .unwrap()
        .with_env_defaults(env(&[
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CREDENTIALS_CACHE_TTL", "120"),
        ]));

        assert!(config.credential_config("default").is_none());
        assert_eq!(config.cache.ttl, Some(10));
    }

    #[test]
    fn test_load_from_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("credentials.toml");
        std::fs::write(
            &path,
            r#"
            [credentials.default]
            driver = "constant"
            access_token = "abc"
            "#,
        )
        .unwrap();

        let config = CredentialsConfig::load_from_path(&path).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(
            config.credential_config("default").unwrap().options.driver.as_deref(),
            Some("constant")
        );
    }

    #[test]
    fn test_load_errors() {
        let temp = tempfile::TempDir::new().unwrap();

        let missing = temp.path().join("missing.toml");
        assert!(matches!(
            CredentialsConfig::load_from_path(&missing),
            Err(ConfigError::Io { .. })
        ));

        let invalid = temp.path().join("invalid.toml");
        std::fs::write(&invalid, "credential = [").unwrap();
        assert!(matches!(
            CredentialsConfig::load_from_path(&invalid),
            Err(ConfigError::Parse { .. })
        ));
    }
}
