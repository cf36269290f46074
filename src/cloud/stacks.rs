//! CloudFormation stack operations.

use async_trait::async_trait;
use aws_sdk_cloudformation::types::{ChangeSetType, TemplateStage};
use aws_sdk_cloudformation::Client;
use tracing::debug;

use crate::error::{CloudError, Result};

use super::types::{StackResource, StackStatus};

const CHANGE_SET_DESCRIPTION: &str = "Remove unused IAM roles (automated)";

/// Stack-level operations against one account session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackService: Send + Sync {
    /// Fetches the original (user-submitted) template body, if the stack
    /// has one available.
    async fn original_template(&self, stack: &str) -> Result<Option<String>>;

    /// Lists every resource in the stack.
    async fn stack_resources(&self, stack: &str) -> Result<Vec<StackResource>>;

    /// Creates an UPDATE change set from `template_body` under `name`.
    async fn create_change_set(&self, stack: &str, name: &str, template_body: &str) -> Result<()>;

    /// Executes a previously created change set.
    async fn execute_change_set(&self, stack: &str, name: &str) -> Result<()>;

    /// Starts stack deletion.
    async fn delete_stack(&self, stack: &str) -> Result<()>;

    /// Returns the current stack status, or `None` once the stack no
    /// longer exists.
    async fn stack_status(&self, stack: &str) -> Result<Option<StackStatus>>;
}

/// CloudFormation-backed [`StackService`].
#[derive(Debug)]
pub struct CfnStackService {
    client: Client,
}

impl CfnStackService {
    /// Wraps a CloudFormation client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StackService for CfnStackService {
    async fn original_template(&self, stack: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get_template()
            .stack_name(stack)
            .template_stage(TemplateStage::Original)
            .send()
            .await;

        match response {
            Ok(output) => Ok(output.template_body),
            // A stack without a retrievable template is a skip condition,
            // not a failure.
            Err(e) if e.to_string().contains("does not exist") => Ok(None),
            Err(e) => Err(CloudError::stack(stack, "get_template", e.to_string()).into()),
        }
    }

    async fn stack_resources(&self, stack: &str) -> Result<Vec<StackResource>> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self.client.list_stack_resources().stack_name(stack);
            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }

            let response = request.send().await.map_err(|e| {
                CloudError::stack(stack, "list_stack_resources", e.to_string())
            })?;

            for summary in response.stack_resource_summaries.unwrap_or_default() {
                resources.push(StackResource {
                    logical_id: summary.logical_resource_id.unwrap_or_default(),
                    physical_id: summary.physical_resource_id,
                    resource_type: summary.resource_type.unwrap_or_default(),
                });
            }

            match response.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(stack, count = resources.len(), "Listed stack resources");
        Ok(resources)
    }

    async fn create_change_set(&self, stack: &str, name: &str, template_body: &str) -> Result<()> {
        self.client
            .create_change_set()
            .stack_name(stack)
            .change_set_name(name)
            .change_set_type(ChangeSetType::Update)
            .description(CHANGE_SET_DESCRIPTION)
            .template_body(template_body)
            .send()
            .await
            .map_err(|e| CloudError::stack(stack, "create_change_set", e.to_string()))?;
        Ok(())
    }

    async fn execute_change_set(&self, stack: &str, name: &str) -> Result<()> {
        self.client
            .execute_change_set()
            .stack_name(stack)
            .change_set_name(name)
            .send()
            .await
            .map_err(|e| CloudError::stack(stack, "execute_change_set", e.to_string()))?;
        Ok(())
    }

    async fn delete_stack(&self, stack: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| CloudError::stack(stack, "delete_stack", e.to_string()))?;
        Ok(())
    }

    async fn stack_status(&self, stack: &str) -> Result<Option<StackStatus>> {
        let response = self
            .client
            .describe_stacks()
            .stack_name(stack)
            .send()
            .await;

        match response {
            Ok(output) => Ok(output
                .stacks
                .unwrap_or_default()
                .into_iter()
                .next()
                .and_then(|s| s.stack_status)
                .map(|status| StackStatus(status.as_str().to_string()))),
            // DescribeStacks on a deleted stack fails with a validation
            // error; treat that as "gone".
            Err(e) if e.to_string().contains("does not exist") => Ok(None),
            Err(e) => Err(CloudError::stack(stack, "describe_stacks", e.to_string()).into()),
        }
    }
}
