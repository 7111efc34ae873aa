//! Managed identity endpoint of App Service and Azure Functions.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use url::Url;

use super::CredentialDriver;
use super::request::send_token_request;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::secret::Secret;
use crate::token::AccessToken;

/// API version of the App Service managed identity endpoint.
pub const APP_SERVICE_API_VERSION: &str = "2019-08-01";

const IDENTITY_HEADER_NAME: &str = "X-IDENTITY-HEADER";

/// Selects a user-assigned identity. Without one the system-assigned
/// identity is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityId {
    ClientId(String),
    ResourceId(String),
    PrincipalId(String),
}

impl ManagedIdentityId {
    /// Pick an identifier, preferring the client id, then the resource id,
    /// then the principal id.
    pub fn from_options(
        client_id: Option<String>,
        resource_id: Option<String>,
        principal_id: Option<String>,
    ) -> Option<Self> {
        client_id
            .map(Self::ClientId)
            .or(resource_id.map(Self::ResourceId))
            .or(principal_id.map(Self::PrincipalId))
    }

    /// Query parameter carrying this identifier.
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Self::ClientId(id) => ("client_id", id.as_str()),
            Self::ResourceId(id) => ("mi_res_id", id.as_str()),
            Self::PrincipalId(id) => ("principal_id", id.as_str()),
        }
    }
}

/// Fetches tokens from the local managed identity endpoint.
#[derive(Debug, Clone)]
pub struct ManagedIdentityDriver {
    http: reqwest::Client,
    endpoint: String,
    identity_header: Secret,
    identity: Option<ManagedIdentityId>,
}

impl ManagedIdentityDriver {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        identity_header: impl Into<Secret>,
        identity: Option<ManagedIdentityId>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            identity_header: identity_header.into(),
            identity,
        }
    }

    /// Create a driver for App Service, falling back to the
    /// `IDENTITY_ENDPOINT` and `IDENTITY_HEADER` environment variables the
    /// platform injects.
    pub fn for_app_service(
        http: reqwest::Client,
        endpoint: Option<String>,
        identity_header: Option<String>,
        identity: Option<ManagedIdentityId>,
    ) -> Result<Self, CredentialError> {
        let endpoint = endpoint
            .or_else(|| non_empty_var("IDENTITY_ENDPOINT"))
            .ok_or_else(|| {
                CredentialError::config("managed identity endpoint is not set (IDENTITY_ENDPOINT)")
            })?;
        let identity_header = identity_header
            .or_else(|| non_empty_var("IDENTITY_HEADER"))
            .ok_or_else(|| {
                CredentialError::config("managed identity header is not set (IDENTITY_HEADER)")
            })?;

        Ok(Self::new(http, endpoint, identity_header, identity))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> Option<&ManagedIdentityId> {
        self.identity.as_ref()
    }

    /// URL requesting a token for `scope`.
    pub fn token_url(&self, scope: &Scope) -> Result<Url, CredentialError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            CredentialError::config(format!(
                "invalid managed identity endpoint '{}': {}",
                self.endpoint, e
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("resource", scope.resource());
            query.append_pair("api-version", APP_SERVICE_API_VERSION);
            if let Some(identity) = &self.identity {
                let (name, value) = identity.query_pair();
                query.append_pair(name, value);
            }
        }

        Ok(url)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl CredentialDriver for ManagedIdentityDriver {
    fn name(&self) -> &str {
        "managed_identity"
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        let url = self.token_url(scope)?;

        tracing::info!(
            driver = self.name(),
            scope = %scope,
            endpoint = %self.endpoint,
            "Requesting managed identity token"
        );

        let request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(IDENTITY_HEADER_NAME, self.identity_header.expose());

        send_token_request(self.name(), scope, url.as_str(), request).await
    }
}
