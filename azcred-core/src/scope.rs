//! Normalized permission scopes.
//!
//! A [`Scope`] is the set of OAuth scopes a token is requested for. The set
//! is trimmed, sorted and deduplicated on construction so that the same
//! permissions given in a different order compare equal and map to the same
//! cache entry.
//!
//! # Examples
//!
//! ```
//! use azcred_core::Scope;
//!
//! let a = Scope::from(vec!["https://b.azure.net/.default", "https://a.azure.net/.default"]);
//! let b = Scope::from(vec!["https://a.azure.net/.default", "https://b.azure.net/.default"]);
//!
//! assert_eq!(a, b);
//! assert_eq!(a.cache_key(), "a.azure.net+b.azure.net");
//! assert_eq!(a.to_string(), "https://a.azure.net/.default https://b.azure.net/.default");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Suffix Azure uses to request all statically configured permissions of a resource.
pub const DEFAULT_SUFFIX: &str = "/.default";

/// Error type for scope construction.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The value could not be parsed as an absolute URI.
    #[error("invalid scope URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },
}

/// Ordered, normalized set of scope strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ScopeRepr", into = "String")]
pub struct Scope(Vec<String>);

impl Scope {
    /// Create a scope from any collection of scope strings.
    ///
    /// Every entry is trimmed, the result is sorted lexicographically and
    /// repeated entries are kept once.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scopes: Vec<String> = scopes
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        scopes.sort();
        scopes.dedup();
        Self(scopes)
    }

    /// Create a scope for the resource addressed by `uri`.
    ///
    /// The path of the URI is replaced by `/.default`.
    pub fn from_uri(uri: &str) -> Result<Self, ScopeError> {
        let url = Url::parse(uri.trim()).map_err(|e| ScopeError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;

        if url.cannot_be_a_base() {
            return Err(ScopeError::InvalidUri {
                uri: uri.to_string(),
                message: "URI has no path component".to_string(),
            });
        }

        Ok(Self::from(url))
    }

    /// Scope for Azure Key Vault.
    pub fn key_vault() -> Self {
        Self::from("https://vault.azure.net/.default")
    }

    /// Scope for Azure Storage accounts.
    pub fn storage_account() -> Self {
        Self::from("https://storage.azure.com/.default")
    }

    /// Scope for Azure Web PubSub.
    pub fn web_pub_sub() -> Self {
        Self::from("https://webpubsub.azure.com/.default")
    }

    /// Scope for the Microsoft Graph API.
    pub fn microsoft_graph() -> Self {
        Self::from("https://graph.microsoft.com/.default")
    }

    /// The individual scope strings, in canonical order.
    pub fn scopes(&self) -> &[String] {
        &self.0
    }

    /// Whether this scope contains no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The resource of the first scope, for mechanisms that address a
    /// resource instead of an OAuth scope.
    pub fn resource(&self) -> &str {
        match self.0.first() {
            Some(first) => first.strip_suffix(DEFAULT_SUFFIX).unwrap_or(first),
            None => "",
        }
    }

    /// Stable key identifying this scope in token caches.
    pub fn cache_key(&self) -> String {
        self.0
            .iter()
            .map(|s| cache_key_part(s))
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Reduce an `https://` scope to its host and make the rest key-safe.
fn cache_key_part(scope: &str) -> String {
    let part = match scope.strip_prefix("https://") {
        Some(rest) => rest.split('/').next().unwrap_or(rest),
        None => scope,
    };

    part.replace(['+', ':', '/'], "_")
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Self::new([s])
    }
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        Self::new([s])
    }
}

impl From<&String> for Scope {
    fn from(s: &String) -> Self {
        Self::new([s])
    }
}

impl From<Vec<String>> for Scope {
    fn from(scopes: Vec<String>) -> Self {
        Self::new(scopes)
    }
}

impl From<Vec<&str>> for Scope {
    fn from(scopes: Vec<&str>) -> Self {
        Self::new(scopes)
    }
}

impl From<&[&str]> for Scope {
    fn from(scopes: &[&str]) -> Self {
        Self::new(scopes)
    }
}

impl<const N: usize> From<[&str; N]> for Scope {
    fn from(scopes: [&str; N]) -> Self {
        Self::new(scopes)
    }
}

impl From<Url> for Scope {
    fn from(mut url: Url) -> Self {
        url.set_path(DEFAULT_SUFFIX);
        Self::new([url.as_str()])
    }
}

impl From<&Scope> for Scope {
    fn from(scope: &Scope) -> Self {
        scope.clone()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// Accepted serialized forms: a space separated string or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeRepr {
    Joined(String),
    List(Vec<String>),
}

impl From<ScopeRepr> for Scope {
    fn from(repr: ScopeRepr) -> Self {
        match repr {
            ScopeRepr::Joined(s) => Self::new(s.split_whitespace()),
            ScopeRepr::List(list) => Self::new(list),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_one_scope() {
        let scope = Scope::from("https://keyvault.azure.net/.default");
        assert_eq!(scope.cache_key(), "keyvault.azure.net");
    }

    #[test]
    fn test_cache_key_two_scopes_sorted() {
        let scope = Scope::from(vec![
            "https://webpubsub.azure.net/.default",
            "https://keyvault.azure.net/.default",
        ]);
        assert_eq!(scope.cache_key(), "keyvault.azure.net+webpubsub.azure.net");
    }

    #[test]
    fn test_order_insensitive() {
        let a = Scope::from(["b", "a"]);
        let b = Scope::from(["a", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_entries_are_trimmed() {
        let scope = Scope::from(vec!["  https://vault.azure.net/.default \n"]);
        assert_eq!(scope.scopes(), ["https://vault.azure.net/.default"]);
    }

    #[test]
    fn test_repeated_entries_collapse() {
        let scope = Scope::from(vec!["a", " a", "b", "a"]);
        assert_eq!(scope.cache_key(), "a+b");
        assert_eq!(scope, Scope::from(vec!["b", "a"]));
    }

    #[test]
    fn test_cache_key_non_https_scope() {
        let scope = Scope::from("api://my-app/user_impersonation");
        assert_eq!(scope.cache_key(), "api___my-app_user_impersonation");
    }

    #[test]
    fn test_cache_key_without_path() {
        let scope = Scope::from("https://management.azure.com");
        assert_eq!(scope.cache_key(), "management.azure.com");
    }

    #[test]
    fn test_resource_strips_default_suffix() {
        let scope = Scope::from("https://vault.azure.net/.default");
        assert_eq!(scope.resource(), "https://vault.azure.net");

        let scope = Scope::from("https://management.azure.com/user_impersonation");
        assert_eq!(scope.resource(), "https://management.azure.com/user_impersonation");
    }

    #[test]
    fn test_display_is_space_joined() {
        let scope = Scope::from(["s2", "s1"]);
        assert_eq!(scope.to_string(), "s1 s2");
    }

    #[test]
    fn test_from_uri_replaces_path() {
        let scope = Scope::from_uri("https://myvault.vault.azure.net/secrets/foo").unwrap();
        assert_eq!(scope.to_string(), "https://myvault.vault.azure.net/.default");
        assert_eq!(scope.cache_key(), "myvault.vault.azure.net");
    }

    #[test]
    fn test_from_uri_rejects_garbage() {
        assert!(matches!(
            Scope::from_uri("not a uri"),
            Err(ScopeError::InvalidUri { .. })
        ));
        assert!(Scope::from_uri("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_well_known_scopes() {
        assert_eq!(Scope::key_vault().cache_key(), "vault.azure.net");
        assert_eq!(Scope::microsoft_graph().resource(), "https://graph.microsoft.com");
    }

    #[test]
    fn test_serde_forms() {
        let scope: Scope = serde_json::from_str("\"s2 s1\"").unwrap();
        assert_eq!(scope, Scope::from(["s1", "s2"]));

        let scope: Scope = serde_json::from_str("[\"b\", \"a\"]").unwrap();
        assert_eq!(serde_json::to_string(&scope).unwrap(), "\"a b\"");
    }
}
