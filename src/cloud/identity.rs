//! IAM role operations.

use async_trait::async_trait;
use aws_sdk_iam::Client;
use serde_json::json;

use crate::error::{CloudError, Result};

/// The deny-all assume-role policy applied during quarantine.
///
/// A role carrying this trust policy cannot be assumed by anything, which
/// is the point: quarantine must be observable (things break loudly) and
/// reversible (the original policy is backed up first).
#[must_use]
pub fn deny_all_trust_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Deny",
                "Action": "sts:AssumeRole",
                "Principal": "*"
            }
        ]
    })
}

/// Role-level operations against one account session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Fetches the role's current trust policy document as parsed JSON.
    async fn trust_policy(&self, role: &str) -> Result<serde_json::Value>;

    /// Replaces the role's trust policy.
    async fn set_trust_policy(&self, role: &str, policy: &serde_json::Value) -> Result<()>;
}

/// IAM-backed [`IdentityService`].
#[derive(Debug)]
pub struct IamIdentityService {
    client: Client,
}

impl IamIdentityService {
    /// Wraps an IAM client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityService for IamIdentityService {
    async fn trust_policy(&self, role: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get_role()
            .role_name(role)
            .send()
            .await
            .map_err(|e| CloudError::identity(role, "get_role", e.to_string()))?;

        let document = response
            .role
            .and_then(|role| role.assume_role_policy_document)
            .ok_or_else(|| {
                CloudError::identity(role, "get_role", "role has no trust policy document")
            })?;

        // GetRole returns the document URL-encoded.
        let decoded = percent_decode(&document);
        serde_json::from_str(&decoded)
            .map_err(|e| CloudError::identity(role, "get_role", e.to_string()).into())
    }

    async fn set_trust_policy(&self, role: &str, policy: &serde_json::Value) -> Result<()> {
        self.client
            .update_assume_role_policy()
            .role_name(role)
            .policy_document(policy.to_string())
            .send()
            .await
            .map_err(|e| CloudError::identity(role, "update_assume_role_policy", e.to_string()))?;
        Ok(())
    }
}

/// Decodes the percent-encoding IAM applies to policy documents.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            // Slice the bytes, not the str: the escape may sit next to a
            // multi-byte character.
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
