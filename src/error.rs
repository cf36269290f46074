//! Error types for the rolesweep cleanup workflow.
//!
//! This module provides the error hierarchy for all operations in the
//! cleanup lifecycle: configuration, state-store access, cross-account
//! session acquisition, cloud control-plane calls, and artifact storage.
//!
//! Account-scoped failures (a target account whose execution role cannot
//! be assumed) and item-scoped skips (a stack with a non-JSON template)
//! are *not* errors: phases record them as outcomes in their reports and
//! keep going. Only infrastructure failures surface through these types.

use thiserror::Error;

/// The main error type for the rolesweep workflow.
#[derive(Debug, Error)]
pub enum RolesweepError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State-store access errors.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cross-account session acquisition errors.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Cloud control-plane errors.
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Artifact-store errors.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A configuration value is present but unusable.
    #[error("Invalid configuration value for {name}: {message}")]
    InvalidValue {
        /// Name of the offending variable.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// State-store access errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A table request failed.
    #[error("Store request '{operation}' failed: {message}")]
    Request {
        /// The store operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// An item could not be interpreted.
    #[error("Malformed item at {key}: {message}")]
    MalformedItem {
        /// Key of the malformed item.
        key: String,
        /// Description of the problem.
        message: String,
    },

    /// A composite partition key could not be split.
    #[error("Malformed partition key: {raw}")]
    MalformedKey {
        /// The raw key string.
        raw: String,
    },

    /// An item expected to exist was not found.
    #[error("Item not found: {key}")]
    NotFound {
        /// Key of the missing item.
        key: String,
    },
}

/// Cross-account session acquisition errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The execution role in the target account could not be assumed.
    #[error("Failed to assume execution role in account {account}: {message}")]
    AssumeRoleFailed {
        /// The target account.
        account: String,
        /// Description of the failure.
        message: String,
    },

    /// The assume-role response carried no credentials.
    #[error("Assume-role response for account {account} contained no credentials")]
    MissingCredentials {
        /// The target account.
        account: String,
    },
}

/// Cloud control-plane errors.
#[derive(Debug, Error)]
pub enum CloudError {
    /// A CloudFormation stack operation failed.
    #[error("Stack operation '{operation}' on {stack} failed: {message}")]
    Stack {
        /// The stack name.
        stack: String,
        /// The operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// An IAM role operation failed.
    #[error("Identity operation '{operation}' on role {role} failed: {message}")]
    Identity {
        /// The role name.
        role: String,
        /// The operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// A secret/parameter lookup failed.
    #[error("Secret lookup for {name} failed: {message}")]
    Secret {
        /// The secret or parameter name.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

/// Artifact-store errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Writing an object failed.
    #[error("Failed to store artifact {key}: {message}")]
    Put {
        /// Object key.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// Serializing or compressing a document failed.
    #[error("Failed to encode artifact: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for rolesweep operations.
pub type Result<T> = std::result::Result<T, RolesweepError>;

impl RolesweepError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl StoreError {
    /// Creates a request error for a named store operation.
    #[must_use]
    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-item error for the given key.
    #[must_use]
    pub fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedItem {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl CloudError {
    /// Creates a stack-operation error.
    #[must_use]
    pub fn stack(
        stack: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Stack {
            stack: stack.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an identity-operation error.
    #[must_use]
    pub fn identity(
        role: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Identity {
            role: role.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}
