//! Secret lookup for the notifier webhook.

use async_trait::async_trait;
use aws_sdk_ssm::Client;

use crate::error::{CloudError, Result};

/// Read access to secret configuration values.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches and decrypts the named parameter.
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// SSM Parameter Store backed [`SecretStore`].
#[derive(Debug)]
pub struct SsmSecretStore {
    client: Client,
}

impl SsmSecretStore {
    /// Wraps an SSM client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| CloudError::Secret {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        response
            .parameter
            .and_then(|p| p.value)
            .ok_or_else(|| {
                CloudError::Secret {
                    name: name.to_string(),
                    message: "parameter has no value".to_string(),
                }
                .into()
            })
    }
}
