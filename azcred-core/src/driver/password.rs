//! Resource owner password grant.

use async_trait::async_trait;

use super::CredentialDriver;
use super::oauth::OAuthGrant;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::secret::Secret;
use crate::token::AccessToken;

/// Authenticates a user with username and password.
///
/// Confidential clients may add their client secret.
#[derive(Debug, Clone)]
pub struct PasswordDriver {
    grant: OAuthGrant,
    username: String,
    password: Secret,
    client_secret: Option<Secret>,
}

impl PasswordDriver {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        Self {
            grant: OAuthGrant::new(http, token_endpoint, "password", client_id),
            username: username.into(),
            password: password.into(),
            client_secret: None,
        }
    }

    /// Send a client secret along with the user's credentials.
    pub fn with_client_secret(mut self, client_secret: impl Into<Secret>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn grant(&self) -> &OAuthGrant {
        &self.grant
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

#[async_trait]
impl CredentialDriver for PasswordDriver {
    fn name(&self) -> &str {
        "password"
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        self.grant
            .request(
                self.name(),
                scope,
                &[
                    ("username", Some(self.username.as_str())),
                    ("password", Some(self.password.expose())),
                    ("client_secret", self.client_secret.as_ref().map(Secret::expose)),
                ],
            )
            .await
    }
}
