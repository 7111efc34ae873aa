//! Access tokens returned by credential drivers.
//!
//! This module provides:
//! - [`AccessToken`] - An immutable token value with its expiry and metadata
//! - [`TokenError`] - Errors raised while interpreting a token payload
//!
//! Tokens can be built from the different shapes identity endpoints return:
//! a bare token string, a JSON document using any of the common field name
//! conventions (`access_token`/`accessToken`/`token`, absolute
//! `expires_on`/`expiresOn`/`expires_at`/`expiresAt` or relative
//! `expires_in`/`expiresIn`), or an HTTP response carrying either.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::secret::Secret;

/// Leeway subtracted from a token's lifetime when none is given.
pub const DEFAULT_CACHE_LEEWAY: Duration = Duration::minutes(5);

/// Cache lifetime used for tokens without an expiry when none is given.
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::hours(1);

const TOKEN_FIELDS: [&str; 3] = ["accessToken", "access_token", "token"];
const EXPIRES_ON_FIELDS: [&str; 4] = ["expiresOn", "expires_on", "expiresAt", "expires_at"];
const EXPIRES_IN_FIELDS: [&str; 2] = ["expires_in", "expiresIn"];

/// Error type for token interpretation.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The value has a shape that cannot describe a token at all.
    #[error("invalid token format: {message}")]
    InvalidFormat { message: String },

    /// The payload was expected to be JSON but could not be parsed.
    #[error("invalid token JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required field is missing from the token document.
    #[error("token document has no '{field}' field")]
    MissingField { field: String },

    /// An expiry field could not be interpreted as an instant or duration.
    #[error("cannot interpret '{value}' as a token expiry")]
    InvalidExpiry { value: String },
}

/// An access token for an Azure resource.
///
/// Tokens are immutable once built. Cloning is cheap enough to hand the same
/// token to the in-process cache, the durable cache and the caller.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct AccessToken {
    access_token: Secret,

    #[serde(with = "chrono::serde::ts_seconds_option")]
    expires_on: Option<DateTime<Utc>>,

    tenant: Option<String>,

    subscription: Option<String>,

    token_type: Option<String>,

    #[serde(skip)]
    decoded: OnceLock<Option<DecodedJwt>>,
}

/// Header and claims of a JWT access token.
#[derive(Debug, Clone)]
struct DecodedJwt {
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl AccessToken {
    /// Create a non-expiring token from its raw value.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            expires_on: None,
            tenant: None,
            subscription: None,
            token_type: None,
            decoded: OnceLock::new(),
        }
    }

    /// Set the absolute expiry of the token.
    pub fn with_expiry(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on = Some(expires_on);
        self
    }

    /// Set the tenant the token was issued for.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Set the subscription the token was issued for.
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Set the token type used in the authorization header.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Interpret a string as a token.
    ///
    /// JSON objects are read as token documents. Anything that is not JSON
    /// is taken to be the bare token value.
    pub fn parse(value: &str) -> Result<Self, TokenError> {
        match serde_json::from_str::<Value>(value) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            Ok(Value::String(token)) => Ok(Self::new(token)),
            _ => Ok(Self::new(value.trim())),
        }
    }

    /// Interpret a string as a JSON token document.
    pub fn from_json_str(value: &str) -> Result<Self, TokenError> {
        let parsed: Value = serde_json::from_str(value)?;
        Self::from_json_value(parsed)
    }

    /// Interpret an already parsed JSON value as a token.
    pub fn from_json_value(value: Value) -> Result<Self, TokenError> {
        match value {
            Value::Object(map) => Self::from_map(&map),
            Value::String(token) => Ok(Self::new(token)),
            other => Err(TokenError::InvalidFormat {
                message: format!("cannot build a token from a JSON {}", json_type(&other)),
            }),
        }
    }

    /// Build a token from a token document.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, TokenError> {
        let access_token = TOKEN_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .ok_or_else(|| TokenError::MissingField {
                field: "access_token".to_string(),
            })?;

        let mut token = Self::new(access_token);
        token.expires_on = expiry_from_map(map, Utc::now())?;
        token.subscription = string_field(map, &["subscription"]);
        token.tenant = string_field(map, &["tenant"]);
        token.token_type = string_field(map, &["tokenType", "token_type"]);

        Ok(token)
    }

    /// Build a token from an HTTP response body.
    pub async fn from_response(response: reqwest::Response) -> Result<Self, TokenError> {
        let body = response.text().await.map_err(|e| TokenError::InvalidFormat {
            message: format!("failed to read response body: {}", e),
        })?;
        Self::parse(&body)
    }

    /// The token value.
    pub fn secret(&self) -> &Secret {
        &self.access_token
    }

    /// The token value as a string slice. Never log the result.
    pub fn expose(&self) -> &str {
        self.access_token.expose()
    }

    /// When the token expires, if known.
    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_on
    }

    /// The tenant reported alongside the token.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// The subscription reported alongside the token.
    pub fn subscription(&self) -> Option<&str> {
        self.subscription.as_deref()
    }

    /// The token type, `Bearer` unless the issuer said otherwise.
    pub fn token_type(&self) -> &str {
        self.token_type.as_deref().unwrap_or("Bearer")
    }

    /// Value for an HTTP `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type(), self.expose())
    }

    /// Whether the token carries an expiry at all.
    pub fn expires(&self) -> bool {
        self.expires_on.is_some()
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check if this token is expired at the given instant.
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_on.map(|exp| at >= exp).unwrap_or(false)
    }

    /// Time left until expiry, negative once expired.
    pub fn expires_in(&self, at: DateTime<Utc>) -> Option<Duration> {
        self.expires_on.map(|exp| exp - at)
    }

    /// How long this token may be kept in a cache.
    ///
    /// This is the remaining lifetime minus `leeway`. Tokens without an
    /// expiry use `default` instead of the remaining lifetime. A non-positive
    /// result means the token must not be cached.
    pub fn cache_lifetime(
        &self,
        leeway: Option<Duration>,
        default: Option<Duration>,
        at: DateTime<Utc>,
    ) -> Duration {
        let lifetime = self
            .expires_in(at)
            .or(default)
            .unwrap_or(DEFAULT_CACHE_LIFETIME);
        lifetime
            .checked_sub(&leeway.unwrap_or(DEFAULT_CACHE_LEEWAY))
            .unwrap_or(Duration::zero())
    }

    /// Decoded JWT header, if the token is a JWT.
    pub fn header(&self) -> Option<&Map<String, Value>> {
        self.decoded().map(|jwt| &jwt.header)
    }

    /// Decoded JWT claims, if the token is a JWT.
    pub fn claims(&self) -> Option<&Map<String, Value>> {
        self.decoded().map(|jwt| &jwt.claims)
    }

    /// Look up a claim by name, falling back to the JWT header.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        let jwt = self.decoded()?;
        jwt.claims.get(name).or_else(|| jwt.header.get(name))
    }

    fn decoded(&self) -> Option<&DecodedJwt> {
        self.decoded
            .get_or_init(|| decode_jwt(self.expose()))
            .as_ref()
    }
}

fn decode_jwt(token: &str) -> Option<DecodedJwt> {
    let mut parts = token.split('.');
    let header = decode_jwt_part(parts.next()?)?;
    let claims = decode_jwt_part(parts.next()?)?;
    Some(DecodedJwt { header, claims })
}

fn decode_jwt_part(part: &str) -> Option<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD.decode(part.trim_end_matches('=')).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn first_present<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| map.get(*field).filter(|v| !v.is_null()))
}

fn expiry_from_map(
    map: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, TokenError> {
    if let Some(on) = first_present(map, &EXPIRES_ON_FIELDS) {
        return parse_instant(on).map(Some);
    }

    if let Some(secs) = first_present(map, &EXPIRES_IN_FIELDS) {
        let invalid = || TokenError::InvalidExpiry {
            value: secs.to_string(),
        };
        let delta = number_of(secs)
            .and_then(Duration::try_seconds)
            .ok_or_else(invalid)?;
        return now.checked_add_signed(delta).map(Some).ok_or_else(invalid);
    }

    Ok(None)
}

fn number_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Absolute expiry: unix seconds, RFC 3339, or the CLI's local timestamp.
fn parse_instant(value: &Value) -> Result<DateTime<Utc>, TokenError> {
    let invalid = || TokenError::InvalidExpiry {
        value: value.to_string(),
    };

    if let Some(secs) = number_of(value) {
        return DateTime::from_timestamp(secs, 0).ok_or_else(invalid);
    }

    let text = value.as_str().ok_or_else(invalid)?.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|_| invalid())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(invalid)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl TryFrom<Value> for AccessToken {
    type Error = TokenError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json_value(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &self.access_token)
            .field("expires_on", &self.expires_on)
            .field("tenant", &self.tenant)
            .field("subscription", &self.subscription)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.access_token == other.access_token
            && self.expires_on == other.expires_on
            && self.tenant == other.tenant
            && self.subscription == other.subscription
            && self.token_type == other.token_type
    }
}

impl Eq for AccessToken {}
