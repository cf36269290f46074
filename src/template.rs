//! CloudFormation template surgery.
//!
//! The refine phase removes unused IAM role resources from a stack's
//! original template and submits the trimmed document as a change set.
//! Only JSON templates are handled; a non-JSON (YAML) template makes the
//! stack ineligible for refinement and the caller skips it.

use std::collections::HashSet;

use serde_json::Value;

use crate::cloud::StackResource;

/// A parsed JSON stack template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTemplate {
    document: Value,
}

impl StackTemplate {
    /// Parses a template body. Returns `None` unless the body is a JSON
    /// object with a `Resources` object, which is the only shape this
    /// tool can edit safely.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let document: Value = serde_json::from_str(body).ok()?;
        if !document.is_object() {
            return None;
        }
        if !document.get("Resources").is_some_and(Value::is_object) {
            return None;
        }
        Some(Self { document })
    }

    /// Whether the template declares the given logical ID.
    #[must_use]
    pub fn contains_resource(&self, logical_id: &str) -> bool {
        self.resources()
            .is_some_and(|resources| resources.contains_key(logical_id))
    }

    /// Removes a resource by logical ID. Returns whether it was present.
    pub fn remove_resource(&mut self, logical_id: &str) -> bool {
        self.document
            .get_mut("Resources")
            .and_then(Value::as_object_mut)
            .is_some_and(|resources| resources.remove(logical_id).is_some())
    }

    /// Number of remaining resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources().map_or(0, serde_json::Map::len)
    }

    /// Serializes the template back to a body string. Key order follows
    /// the original document, so re-running the same removal yields the
    /// same body.
    #[must_use]
    pub fn to_body(&self) -> String {
        self.document.to_string()
    }

    fn resources(&self) -> Option<&serde_json::Map<String, Value>> {
        self.document.get("Resources").and_then(Value::as_object)
    }
}

/// Logical IDs of IAM role resources whose physical names are in the
/// unused set and which still exist in the original template.
///
/// The live resource list is the join between physical role names and
/// template logical IDs; intersecting with the template guards against
/// resources already removed or renamed out of band. Physical IDs may
/// arrive as full ARNs; the role name is the segment after the last `/`.
#[must_use]
pub fn removal_set(
    resources: &[StackResource],
    unused: &HashSet<String>,
    template: &StackTemplate,
) -> Vec<String> {
    resources
        .iter()
        .filter(|r| r.resource_type == "AWS::IAM::Role")
        .filter(|r| {
            r.physical_id
                .as_deref()
                .map(physical_role_name)
                .is_some_and(|name| unused.contains(name))
        })
        .filter(|r| template.contains_resource(&r.logical_id))
        .map(|r| r.logical_id.clone())
        .collect()
}

fn physical_role_name(physical_id: &str) -> &str {
    physical_id.rsplit('/').next().unwrap_or(physical_id)
}
