//! Common shape of the OAuth 2.0 token endpoint grants.

use reqwest::header::CONTENT_TYPE;

use super::request::{encode_form, send_token_request};
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

/// Token endpoint of the Microsoft identity platform for a tenant.
pub fn microsoft_login_token_endpoint(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{}/oauth2/v2.0/token", tenant)
}

/// A grant against an OAuth 2.0 token endpoint.
///
/// Every request carries `client_id`, `grant_type` and `scope`, followed by
/// the parameters of the specific mechanism.
#[derive(Debug, Clone)]
pub struct OAuthGrant {
    http: reqwest::Client,
    token_endpoint: String,
    grant_type: &'static str,
    client_id: String,
}

impl OAuthGrant {
    pub fn new(
        http: reqwest::Client,
        token_endpoint: impl Into<String>,
        grant_type: &'static str,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint: token_endpoint.into(),
            grant_type,
            client_id: client_id.into(),
        }
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn grant_type(&self) -> &str {
        self.grant_type
    }

    /// Build the form body for `scope` followed by `extra` parameters.
    pub fn form_body(&self, scope: &Scope, extra: &[(&str, Option<&str>)]) -> String {
        let scope = scope.to_string();
        let mut params = vec![
            ("client_id", Some(self.client_id.as_str())),
            ("grant_type", Some(self.grant_type)),
            ("scope", Some(scope.as_str())),
        ];
        params.extend_from_slice(extra);
        encode_form(params)
    }

    /// POST the grant to the token endpoint.
    pub async fn request(
        &self,
        driver: &str,
        scope: &Scope,
        extra: &[(&str, Option<&str>)],
    ) -> Result<AccessToken, CredentialError> {
        tracing::info!(
            driver,
            scope = %scope,
            endpoint = %self.token_endpoint,
            "Requesting access token"
        );

        let request = self
            .http
            .post(&self.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.form_body(scope, extra));

        send_token_request(driver, scope, &self.token_endpoint, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_login_token_endpoint() {
        assert_eq!(
            microsoft_login_token_endpoint("contoso.onmicrosoft.com"),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_form_body_order() {
        let grant = OAuthGrant::new(
            reqwest::Client::new(),
            "https://example.test/token",
            "client_credentials",
            "my-client",
        );
        let body = grant.form_body(
            &Scope::key_vault(),
            &[("client_secret", Some("s3cr3t")), ("unused", None)],
        );

        assert_eq!(
            body,
            "client_id=my-client&grant_type=client_credentials\
             &scope=https%3A%2F%2Fvault.azure.net%2F.default&client_secret=s3cr3t"
        );
    }
}
