//! Helpers shared by the HTTP based drivers.

use crate::error::{CredentialError, ProviderError};
use crate::scope::Scope;
use crate::token::AccessToken;

/// Encode ordered parameters as an `application/x-www-form-urlencoded` body.
///
/// Parameters without a value are left out. Spaces are encoded as `%20`.
///
/// ```
/// use azcred_core::driver::request::encode_form;
///
/// let body = encode_form([
///     ("grant_type", Some("client_credentials")),
///     ("client_secret", None),
///     ("scope", Some("https://vault.azure.net/.default a b")),
/// ]);
/// assert_eq!(
///     body,
///     "grant_type=client_credentials&scope=https%3A%2F%2Fvault.azure.net%2F.default%20a%20b"
/// );
/// ```
pub fn encode_form<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    params
        .into_iter()
        .filter_map(|(key, value)| {
            value.map(|v| format!("{}={}", urlencoding::encode(key), urlencoding::encode(v)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Send a token request and interpret the response.
///
/// - transport errors become [`CredentialError::Request`]
/// - non-success statuses become [`CredentialError::Response`], carrying the
///   provider's error document when the body has one
/// - success bodies are parsed with [`AccessToken::parse`]
pub async fn send_token_request(
    driver: &str,
    scope: &Scope,
    url: &str,
    request: reqwest::RequestBuilder,
) -> Result<AccessToken, CredentialError> {
    let request_failed = |source: reqwest::Error| CredentialError::Request {
        driver: driver.to_string(),
        scope: scope.to_string(),
        url: url.to_string(),
        source,
    };

    let response = request.send().await.map_err(request_failed)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let error = ProviderError::from_body(&body);
        let reason = error
            .as_ref()
            .and_then(ProviderError::message)
            .or(status.canonical_reason())
            .unwrap_or("unknown error")
            .to_string();

        tracing::warn!(driver, scope = %scope, status = %status, "Token request rejected: {}", reason);

        return Err(CredentialError::Response {
            driver: driver.to_string(),
            scope: scope.to_string(),
            status,
            reason,
            error,
        });
    }

    let body = response.text().await.map_err(request_failed)?;
    AccessToken::parse(&body).map_err(|e| CredentialError::invalid_token(driver, scope, e))
}
