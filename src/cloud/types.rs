//! Shared types for the per-account cloud service clients.

use std::fmt;
use std::sync::Arc;

use super::identity::IdentityService;
use super::stacks::StackService;

/// One resource inside a CloudFormation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResource {
    /// The template-level logical ID.
    pub logical_id: String,
    /// The provisioned resource name or ARN, when the resource exists.
    pub physical_id: Option<String>,
    /// The CloudFormation resource type, e.g. `AWS::IAM::Role`.
    pub resource_type: String,
}

/// A raw CloudFormation stack status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStatus(pub String);

impl StackStatus {
    /// Whether this status ends an execution wait.
    ///
    /// Any `COMPLETE`, `FAILED`, or `ROLLBACK` status is terminal,
    /// including failure statuses; the caller records the outcome rather
    /// than treating failure as an error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.0.contains("COMPLETE") || self.0.contains("FAILED") || self.0.contains("ROLLBACK")
    }

    /// The raw status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The service clients for one target account session.
#[derive(Clone)]
pub struct CloudClients {
    /// CloudFormation operations.
    pub stacks: Arc<dyn StackService>,
    /// IAM operations.
    pub identity: Arc<dyn IdentityService>,
}

impl fmt::Debug for CloudClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudClients").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        for status in [
            "UPDATE_COMPLETE",
            "DELETE_COMPLETE",
            "CREATE_FAILED",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "ROLLBACK_COMPLETE",
        ] {
            assert!(StackStatus(status.to_string()).is_terminal(), "{status}");
        }
    }

    #[test]
    fn test_non_terminal_statuses() {
        for status in ["UPDATE_IN_PROGRESS", "DELETE_IN_PROGRESS", "CREATE_IN_PROGRESS"] {
            assert!(!StackStatus(status.to_string()).is_terminal(), "{status}");
        }
    }
}
