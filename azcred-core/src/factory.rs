//! Driver construction from configuration.
//!
//! [`infer_driver`] decides which mechanism a [`DriverConfig`] describes when
//! it does not name one:
//!
//! 1. `identity_endpoint` and `identity_header` - managed identity
//! 2. `client_id` with `tenant_id` or `token_endpoint`, and then
//!    - `client_secret` - client secret
//!    - `username` and `password` - password
//!    - `client_certificate` or `client_certificate_file` - client certificate
//! 3. anything else - Azure CLI

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Duration;

use crate::certificate::{ClientCertificate, PemClientCertificate};
use crate::config::{DEFAULT_NAME, DriverConfig};
use crate::driver::{
    AzureCliDriver, ClientCertificateDriver, ClientSecretDriver, ClosureDriver, CredentialDriver,
    ManagedIdentityDriver, ManagedIdentityId, PasswordDriver, microsoft_login_token_endpoint,
};
use crate::error::CredentialError;
use crate::secret::Secret;
use crate::token::AccessToken;

/// The built-in driver kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Cli,
    ManagedIdentity,
    Secret,
    Certificate,
    Password,
    Constant,
    Empty,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::ManagedIdentity => "managed_identity",
            Self::Secret => "secret",
            Self::Certificate => "certificate",
            Self::Password => "password",
            Self::Constant => "constant",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cli" => Ok(Self::Cli),
            "managed_identity" => Ok(Self::ManagedIdentity),
            "secret" => Ok(Self::Secret),
            "certificate" => Ok(Self::Certificate),
            "password" => Ok(Self::Password),
            "constant" => Ok(Self::Constant),
            "empty" => Ok(Self::Empty),
            other => Err(CredentialError::UnsupportedDriver {
                driver: other.to_string(),
            }),
        }
    }
}

/// Pick the driver a configuration describes, ignoring its `driver` key.
pub fn infer_driver(config: &DriverConfig) -> DriverKind {
    if has(&config.identity_endpoint) && has_secret(&config.identity_header) {
        return DriverKind::ManagedIdentity;
    }

    if (has(&config.tenant_id) || has(&config.token_endpoint)) && has(&config.client_id) {
        if has_secret(&config.client_secret) {
            return DriverKind::Secret;
        }
        if has(&config.username) && has_secret(&config.password) {
            return DriverKind::Password;
        }
        if has_secret(&config.client_certificate) || config.client_certificate_file.is_some() {
            return DriverKind::Certificate;
        }
    }

    DriverKind::Cli
}

fn has(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn has_secret(value: &Option<Secret>) -> bool {
    value.as_ref().is_some_and(|v| !v.expose().trim().is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &str, kind: DriverKind) -> Result<&'a str, CredentialError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| missing(field, kind))
}

fn required_secret<'a>(
    value: &'a Option<Secret>,
    field: &str,
    kind: DriverKind,
) -> Result<&'a Secret, CredentialError> {
    value
        .as_ref()
        .filter(|v| !v.expose().trim().is_empty())
        .ok_or_else(|| missing(field, kind))
}

fn missing(field: &str, kind: DriverKind) -> CredentialError {
    CredentialError::config(format!("'{}' is required for the {} driver", field, kind))
}

/// Builds the built-in drivers.
///
/// All HTTP drivers share the factory's client.
#[derive(Debug, Clone, Default)]
pub struct DriverFactory {
    http: reqwest::Client,
}

impl DriverFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Create the driver named by `config.driver`, inferring it when absent
    /// or `default`.
    pub fn create_driver(&self, config: &DriverConfig) -> Result<Arc<dyn CredentialDriver>, CredentialError> {
        let name = config
            .driver
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_NAME);
        self.create_named(name, config)
    }

    /// Create the driver `name` from `config`; `default` infers the driver.
    pub fn create_named(
        &self,
        name: &str,
        config: &DriverConfig,
    ) -> Result<Arc<dyn CredentialDriver>, CredentialError> {
        let kind = if name.trim() == DEFAULT_NAME {
            infer_driver(config)
        } else {
            name.parse()?
        };

        tracing::debug!(driver = %kind, requested = name, "Creating credential driver");
        self.create(kind, config)
    }

    /// Create a driver of the given kind from `config`.
    pub fn create(
        &self,
        kind: DriverKind,
        config: &DriverConfig,
    ) -> Result<Arc<dyn CredentialDriver>, CredentialError> {
        Ok(match kind {
            DriverKind::Cli => Arc::new(self.create_cli_driver(config)),
            DriverKind::ManagedIdentity => Arc::new(self.create_managed_identity_driver(config)?),
            DriverKind::Secret => Arc::new(self.create_secret_driver(config)?),
            DriverKind::Certificate => Arc::new(self.create_certificate_driver(config)?),
            DriverKind::Password => Arc::new(self.create_password_driver(config)?),
            DriverKind::Constant => Arc::new(self.create_constant_driver(config)?),
            DriverKind::Empty => Arc::new(self.create_empty_driver()),
        })
    }

    pub fn create_cli_driver(&self, config: &DriverConfig) -> AzureCliDriver {
        let mut driver = AzureCliDriver::new(
            config
                .az_path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or("az"),
        );
        if let Some(tenant) = config.tenant_id.as_deref().filter(|t| !t.trim().is_empty()) {
            driver = driver.with_tenant(tenant);
        }
        if let Some(subscription) = config.subscription_id.as_deref().filter(|s| !s.trim().is_empty()) {
            driver = driver.with_subscription(subscription);
        }
        driver
    }

    pub fn create_managed_identity_driver(
        &self,
        config: &DriverConfig,
    ) -> Result<ManagedIdentityDriver, CredentialError> {
        let identity = ManagedIdentityId::from_options(
            non_blank(&config.client_id),
            non_blank(&config.resource_id),
            non_blank(&config.principal_id),
        );

        ManagedIdentityDriver::for_app_service(
            self.http.clone(),
            non_blank(&config.identity_endpoint),
            config
                .identity_header
                .as_ref()
                .map(|h| h.expose().to_string())
                .filter(|h| !h.trim().is_empty()),
            identity,
        )
    }

    pub fn create_secret_driver(&self, config: &DriverConfig) -> Result<ClientSecretDriver, CredentialError> {
        let kind = DriverKind::Secret;
        Ok(ClientSecretDriver::new(
            self.http.clone(),
            token_endpoint(config, kind)?,
            required(&config.client_id, "client_id", kind)?,
            required_secret(&config.client_secret, "client_secret", kind)?.clone(),
        ))
    }

    pub fn create_password_driver(&self, config: &DriverConfig) -> Result<PasswordDriver, CredentialError> {
        let kind = DriverKind::Password;
        let mut driver = PasswordDriver::new(
            self.http.clone(),
            token_endpoint(config, kind)?,
            required(&config.client_id, "client_id", kind)?,
            required(&config.username, "username", kind)?,
            required_secret(&config.password, "password", kind)?.clone(),
        );
        if let Some(secret) = config
            .client_secret
            .as_ref()
            .filter(|s| !s.expose().trim().is_empty())
        {
            driver = driver.with_client_secret(secret.clone());
        }
        Ok(driver)
    }

    pub fn create_certificate_driver(
        &self,
        config: &DriverConfig,
    ) -> Result<ClientCertificateDriver, CredentialError> {
        let kind = DriverKind::Certificate;
        let password = config
            .client_certificate_password
            .as_ref()
            .map(Secret::expose);

        let certificate: Arc<dyn ClientCertificate> = match (
            &config.client_certificate,
            &config.client_certificate_file,
        ) {
            (Some(pem), _) if !pem.expose().trim().is_empty() => {
                Arc::new(PemClientCertificate::from_pem(pem.expose(), password)?)
            }
            (_, Some(path)) => Arc::new(PemClientCertificate::from_file(path, password)?),
            _ => return Err(missing("client_certificate", kind)),
        };

        let mut driver = ClientCertificateDriver::new(
            self.http.clone(),
            token_endpoint(config, kind)?,
            required(&config.client_id, "client_id", kind)?,
            certificate,
        );
        if let Some(ttl) = config.client_assertion_ttl {
            let secs = i64::try_from(ttl)
                .map_err(|_| CredentialError::config("client_assertion_ttl is too large"))?;
            driver = driver.with_assertion_lifetime(Duration::seconds(secs));
        }
        Ok(driver)
    }

    pub fn create_constant_driver(&self, config: &DriverConfig) -> Result<ClosureDriver, CredentialError> {
        let kind = DriverKind::Constant;
        let mut token = AccessToken::new(required_secret(&config.access_token, "access_token", kind)?.expose());
        if let Some(token_type) = non_blank(&config.token_type) {
            token = token.with_token_type(token_type);
        }
        Ok(ClosureDriver::constant(token))
    }

    pub fn create_empty_driver(&self) -> ClosureDriver {
        ClosureDriver::empty()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

/// The explicit token endpoint, or the Microsoft login endpoint of the tenant.
fn token_endpoint(config: &DriverConfig, kind: DriverKind) -> Result<String, CredentialError> {
    if let Some(endpoint) = non_blank(&config.token_endpoint) {
        return Ok(endpoint);
    }
    let tenant = required(&config.tenant_id, "tenant_id", kind)?;
    Ok(microsoft_login_token_endpoint(tenant))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DriverConfig {
        DriverConfig::default()
    }

    #[test]
    fn test_infer_secret() {
        let config = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::Secret);
    }

    #[test]
    fn test_infer_managed_identity() {
        let config = DriverConfig {
            identity_endpoint: Some("http://localhost/msi".to_string()),
            identity_header: Some(Secret::new("header")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::ManagedIdentity);
    }

    #[test]
    fn test_infer_managed_identity_wins() {
        let config = DriverConfig {
            identity_endpoint: Some("http://localhost/msi".to_string()),
            identity_header: Some(Secret::new("header")),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::ManagedIdentity);
    }

    #[test]
    fn test_infer_cli_fallback() {
        assert_eq!(infer_driver(&config()), DriverKind::Cli);

        let endpoint_only = DriverConfig {
            identity_endpoint: Some("http://localhost/msi".to_string()),
            ..config()
        };
        assert_eq!(infer_driver(&endpoint_only), DriverKind::Cli);

        let no_client = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        assert_eq!(infer_driver(&no_client), DriverKind::Cli);

        let nothing_to_authenticate_with = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            ..config()
        };
        assert_eq!(infer_driver(&nothing_to_authenticate_with), DriverKind::Cli);
    }

    #[test]
    fn test_infer_password() {
        let config = DriverConfig {
            token_endpoint: Some("https://example.test/token".to_string()),
            client_id: Some("client".to_string()),
            username: Some("user@example.com".to_string()),
            password: Some(Secret::new("pw")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::Password);
    }

    #[test]
    fn test_infer_secret_before_password() {
        let config = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            username: Some("user@example.com".to_string()),
            password: Some(Secret::new("pw")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::Secret);
    }

    #[test]
    fn test_infer_certificate() {
        let config = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_certificate_file: Some("/etc/cert.pem".into()),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::Certificate);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("  ")),
            ..config()
        };
        assert_eq!(infer_driver(&config), DriverKind::Cli);
    }

    #[test]
    fn test_driver_kind_round_trip() {
        for kind in [
            DriverKind::Cli,
            DriverKind::ManagedIdentity,
            DriverKind::Secret,
            DriverKind::Certificate,
            DriverKind::Password,
            DriverKind::Constant,
            DriverKind::Empty,
        ] {
            assert_eq!(kind.as_str().parse::<DriverKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unsupported_driver() {
        let factory = DriverFactory::default();
        let config = DriverConfig {
            driver: Some("kerberos".to_string()),
            ..config()
        };
        assert!(matches!(
            factory.create_driver(&config),
            Err(CredentialError::UnsupportedDriver { driver }) if driver == "kerberos"
        ));
    }

    #[test]
    fn test_explicit_driver_wins_over_inference() {
        let factory = DriverFactory::default();
        let config = DriverConfig {
            driver: Some("cli".to_string()),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        assert_eq!(factory.create_driver(&config).unwrap().name(), "cli");
    }

    #[test]
    fn test_default_driver_is_inferred() {
        let factory = DriverFactory::default();
        let config = DriverConfig {
            driver: Some("default".to_string()),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        assert_eq!(factory.create_driver(&config).unwrap().name(), "secret");
    }

    #[test]
    fn test_secret_driver_uses_tenant_endpoint() {
        let factory = DriverFactory::default();
        let config = DriverConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: Some(Secret::new("secret")),
            ..config()
        };
        let driver = factory.create_secret_driver(&config).unwrap();
        assert_eq!(
            driver.grant().token_endpoint(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );

        let config = DriverConfig {
            token_endpoint: Some("https://example.test/token".to_string()),
            ..config
        };
        let driver = factory.create_secret_driver(&config).unwrap();
        assert_eq!(driver.grant().token_endpoint(), "https://example.test/token");
    }

    #[test]
    fn test_missing_fields_are_config_errors() {
        let factory = DriverFactory::default();

        let err = factory
            .create_secret_driver(&DriverConfig {
                client_id: Some("client".to_string()),
                client_secret: Some(Secret::new("secret")),
                ..config()
            })
            .unwrap_err();
        assert!(matches!(err, CredentialError::Config { .. }));
        assert!(err.to_string().contains("tenant_id"));

        let err = factory.create_constant_driver(&config()).unwrap_err();
        assert!(err.to_string().contains("access_token"));

        let err = factory
            .create_certificate_driver(&DriverConfig {
                tenant_id: Some("tenant".to_string()),
                client_id: Some("client".to_string()),
                ..config()
            })
            .unwrap_err();
        assert!(err.to_string().contains("client_certificate"));
    }

    #[test]
    fn test_cli_driver_options() {
        let factory = DriverFactory::default();
        let driver = factory.create_cli_driver(&DriverConfig {
            az_path: Some("/opt/az".to_string()),
            subscription_id: Some("sub".to_string()),
            ..config()
        });

        assert_eq!(driver.az_path(), "/opt/az");
        assert!(
            driver
                .args(&crate::Scope::key_vault())
                .ends_with(&["--subscription".to_string(), "sub".to_string()])
        );
    }

    #[test]
    fn test_managed_identity_from_config() {
        let factory = DriverFactory::default();
        let driver = factory
            .create_managed_identity_driver(&DriverConfig {
                identity_endpoint: Some("http://localhost/msi".to_string()),
                identity_header: Some(Secret::new("header")),
                resource_id: Some("/subscriptions/x".to_string()),
                principal_id: Some("principal".to_string()),
                ..config()
            })
            .unwrap();

        assert_eq!(driver.endpoint(), "http://localhost/msi");
        assert_eq!(
            driver.identity(),
            Some(&ManagedIdentityId::ResourceId("/subscriptions/x".to_string()))
        );
    }

    #[test]
    fn test_certificate_driver_from_inline_pem() {
        let factory = DriverFactory::default();
        let driver = factory
            .create_certificate_driver(&DriverConfig {
                tenant_id: Some("tenant".to_string()),
                client_id: Some("client".to_string()),
                client_certificate: Some(Secret::new(include_str!(
                    "../tests/fixtures/client-certificate.pem"
                ))),
                client_assertion_ttl: Some(60),
                ..config()
            })
            .unwrap();

        assert_eq!(driver.grant().client_id(), "client");
        assert!(driver.client_assertion().is_ok());
    }

    #[tokio::test]
    async fn test_constant_driver() {
        let factory = DriverFactory::default();
        let driver = factory
            .create_driver(&DriverConfig {
                driver: Some("constant".to_string()),
                access_token: Some(Secret::new("fixed")),
                token_type: Some("PoP".to_string()),
                ..config()
            })
            .unwrap();

        let token = driver.fetch_token(&crate::Scope::key_vault()).await.unwrap();
        assert_eq!(token.authorization_header(), "PoP fixed");
    }
}
