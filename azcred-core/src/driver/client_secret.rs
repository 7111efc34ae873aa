//! Client credentials grant with a client secret.

use async_trait::async_trait;

use super::CredentialDriver;
use super::oauth::OAuthGrant;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::secret::Secret;
use crate::token::AccessToken;

/// Authenticates an app registration with its client secret.
#[derive(Debug, Clone)]
pub struct ClientSecretDriver {
    grant: OAuthGrant,
    client_secret: Secret,
}

impl ClientSecretDriver {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
    ) -> Self {
        Self {
            grant: OAuthGrant::new(http, token_endpoint, "client_credentials", client_id),
            client_secret: client_secret.into(),
        }
    }

    pub fn grant(&self) -> &OAuthGrant {
        &self.grant
    }
}

#[async_trait]
impl CredentialDriver for ClientSecretDriver {
    fn name(&self) -> &str {
        "secret"
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        self.grant
            .request(
                self.name(),
                scope,
                &[("client_secret", Some(self.client_secret.expose()))],
            )
            .await
    }
}
