//! Cross-account session brokering.
//!
//! Every phase operates on stacks in other accounts by assuming a fixed
//! execution role there. The broker turns an account ID into a set of
//! service clients scoped to that account's credentials.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use tracing::debug;

use crate::error::{Result, SessionError};

use super::identity::IamIdentityService;
use super::stacks::CfnStackService;
use super::types::CloudClients;

const SESSION_NAME: &str = "rolesweep-cleanup";
const SESSION_DURATION_SECS: i32 = 3600;

/// Creates per-account cloud clients.
#[async_trait]
pub trait SessionBroker: Send + Sync {
    /// Assumes the execution role in `account` and returns clients bound
    /// to the resulting credentials.
    async fn clients_for(&self, account: &str) -> Result<CloudClients>;
}

/// STS-backed broker assuming a named role in each target account.
#[derive(Debug)]
pub struct StsSessionBroker {
    sts: aws_sdk_sts::Client,
    base_config: SdkConfig,
    execution_role: String,
}

impl StsSessionBroker {
    /// Creates a broker that assumes `execution_role` in target accounts.
    #[must_use]
    pub fn new(base_config: &SdkConfig, execution_role: impl Into<String>) -> Self {
        Self {
            sts: aws_sdk_sts::Client::new(base_config),
            base_config: base_config.clone(),
            execution_role: execution_role.into(),
        }
    }

    fn role_arn(&self, account: &str) -> String {
        format!("arn:aws:iam::{account}:role/{}", self.execution_role)
    }
}

#[async_trait]
impl SessionBroker for StsSessionBroker {
    async fn clients_for(&self, account: &str) -> Result<CloudClients> {
        let role_arn = self.role_arn(account);
        debug!(account, role_arn, "Assuming execution role");

        let response = self
            .sts
            .assume_role()
            .role_arn(&role_arn)
            .role_session_name(SESSION_NAME)
            .duration_seconds(SESSION_DURATION_SECS)
            .send()
            .await
            .map_err(|e| SessionError::AssumeRoleFailed {
                account: account.to_string(),
                message: e.to_string(),
            })?;

        let granted = response
            .credentials
            .ok_or_else(|| SessionError::MissingCredentials {
                account: account.to_string(),
            })?;

        let credentials = Credentials::new(
            granted.access_key_id,
            granted.secret_access_key,
            Some(granted.session_token),
            None,
            "rolesweep-assume-role",
        );

        let config = self
            .base_config
            .to_builder()
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .build();

        Ok(CloudClients {
            stacks: Arc::new(CfnStackService::new(
                aws_sdk_cloudformation::Client::new(&config),
            )),
            identity: Arc::new(IamIdentityService::new(aws_sdk_iam::Client::new(&config))),
        })
    }
}
