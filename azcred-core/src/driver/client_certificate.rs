//! Client credentials grant with a certificate-signed client assertion.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Header, encode};
use serde::Serialize;
use std::sync::Arc;

use super::CredentialDriver;
use super::oauth::OAuthGrant;
use crate::certificate::ClientCertificate;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

/// Default validity of a client assertion.
pub const DEFAULT_ASSERTION_LIFETIME: Duration = Duration::minutes(5);

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of a client assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    exp: i64,
    iat: i64,
    nbf: i64,
    jti: String,
    iss: &'a str,
    sub: &'a str,
}

/// Authenticates an app registration with a certificate.
///
/// Each token request carries a fresh JWT signed with the certificate's
/// private key and identifying the certificate by its `x5t` thumbprint.
pub struct ClientCertificateDriver {
    grant: OAuthGrant,
    certificate: Arc<dyn ClientCertificate>,
    assertion_lifetime: Duration,
}

impl ClientCertificateDriver {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        certificate: Arc<dyn ClientCertificate>,
    ) -> Self {
        Self {
            grant: OAuthGrant::new(http, token_endpoint, "client_credentials", client_id),
            certificate,
            assertion_lifetime: DEFAULT_ASSERTION_LIFETIME,
        }
    }

    /// Set how long each client assertion is valid.
    pub fn with_assertion_lifetime(mut self, lifetime: Duration) -> Self {
        self.assertion_lifetime = lifetime;
        self
    }

    pub fn grant(&self) -> &OAuthGrant {
        &self.grant
    }

    /// Build a client assertion issued at `now`.
    pub fn client_assertion_at(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let mut header = Header::new(self.certificate.algorithm());
        header.x5t = Some(URL_SAFE_NO_PAD.encode(self.certificate.thumbprint()));

        let claims = AssertionClaims {
            aud: self.grant.token_endpoint(),
            exp: (now + self.assertion_lifetime).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.grant.client_id(),
            sub: self.grant.client_id(),
        };

        encode(&header, &claims, self.certificate.encoding_key()).map_err(|e| {
            CredentialError::Certificate {
                message: format!("failed to sign client assertion: {}", e),
            }
        })
    }

    /// Build a client assertion issued now.
    pub fn client_assertion(&self) -> Result<String, CredentialError> {
        self.client_assertion_at(Utc::now())
    }
}

impl std::fmt::Debug for ClientCertificateDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificateDriver")
            .field("grant", &self.grant)
            .field("assertion_lifetime", &self.assertion_lifetime)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialDriver for ClientCertificateDriver {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        let assertion = self.client_assertion()?;

        self.grant
            .request(
                self.name(),
                scope,
                &[
                    ("client_assertion_type", Some(CLIENT_ASSERTION_TYPE)),
                    ("client_assertion", Some(assertion.as_str())),
                ],
            )
            .await
    }
}
