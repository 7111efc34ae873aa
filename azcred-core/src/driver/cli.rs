//! Tokens from a locally logged-in Azure CLI.

use async_trait::async_trait;
use tokio::process::Command;

use super::CredentialDriver;
use crate::error::CredentialError;
use crate::scope::Scope;
use crate::token::AccessToken;

/// Runs `az account get-access-token` for the scope's resource.
#[derive(Debug, Clone)]
pub struct AzureCliDriver {
    az_path: String,
    tenant_id: Option<String>,
    subscription_id: Option<String>,
}

impl AzureCliDriver {
    pub fn new(az_path: impl Into<String>) -> Self {
        Self {
            az_path: az_path.into(),
            tenant_id: None,
            subscription_id: None,
        }
    }

    /// Request tokens for this tenant instead of the CLI's current one.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Request tokens for this subscription. Ignored when a tenant is set.
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    pub fn az_path(&self) -> &str {
        &self.az_path
    }

    /// Command line arguments for `scope`.
    pub fn args(&self, scope: &Scope) -> Vec<String> {
        let mut args = vec![
            "account".to_string(),
            "get-access-token".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--resource".to_string(),
            scope.resource().to_string(),
        ];

        match (&self.tenant_id, &self.subscription_id) {
            (Some(tenant), _) => {
                args.push("--tenant".to_string());
                args.push(tenant.clone());
            }
            (None, Some(subscription)) => {
                args.push("--subscription".to_string());
                args.push(subscription.clone());
            }
            (None, None) => {}
        }

        args
    }
}

impl Default for AzureCliDriver {
    fn default() -> Self {
        Self::new("az")
    }
}

#[async_trait]
impl CredentialDriver for AzureCliDriver {
    fn name(&self) -> &str {
        "cli"
    }

    async fn fetch_token(&self, scope: &Scope) -> Result<AccessToken, CredentialError> {
        tracing::info!(driver = self.name(), scope = %scope, "Requesting token from Azure CLI");

        let output = Command::new(&self.az_path)
            .args(self.args(scope))
            .output()
            .await
            .map_err(|e| {
                CredentialError::fetch(
                    self.name(),
                    scope,
                    format!("failed to execute {}: {}", self.az_path, e),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::fetch(
                self.name(),
                scope,
                format!("az-cli failed: {}", stderr.trim()),
            ));
        }

        AccessToken::from_json_str(&stdout)
            .map_err(|e| CredentialError::invalid_token(self.name(), scope, e))
    }
}
