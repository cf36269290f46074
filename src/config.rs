//! Runtime settings for the cleanup workflow.
//!
//! Settings come from the environment (optionally seeded from a `.env`
//! file), mirroring the deployment contract of the hosted phases: table
//! names, the artifact bucket, the per-account execution role, and the
//! optional notification webhook parameter.

use crate::error::{ConfigError, Result};

/// Environment variable naming the upstream inventory table.
const ENV_INPUT_TABLE: &str = "ROLESWEEP_INPUT_TABLE";

/// Environment variable naming the cleanup-state table.
const ENV_CLEANUP_TABLE: &str = "ROLESWEEP_CLEANUP_TABLE";

/// Environment variable naming the artifact bucket for policy backups.
const ENV_ARTIFACT_BUCKET: &str = "ROLESWEEP_ARTIFACT_BUCKET";

/// Environment variable naming the per-account execution role.
const ENV_EXECUTION_ROLE: &str = "ROLESWEEP_EXECUTION_ROLE";

/// Environment variable naming the SSM parameter holding the webhook URL.
const ENV_WEBHOOK_PARAM: &str = "ROLESWEEP_WEBHOOK_PARAM";

/// Environment variable naming the AWS region.
const ENV_REGION: &str = "AWS_REGION";

/// Runtime settings for all phases.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the upstream inventory table (read-only).
    pub input_table: String,
    /// Name of the cleanup-state table (owned by this system).
    pub cleanup_table: String,
    /// Bucket receiving compressed trust-policy backups.
    pub artifact_bucket: String,
    /// Name of the role assumed in each target account.
    pub execution_role: String,
    /// SSM parameter holding the notification webhook URL, if notifications
    /// are enabled.
    pub webhook_param: Option<String>,
    /// AWS region override; the SDK default chain applies when unset.
    pub region: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// A `.env` file in the working directory is honored when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing.
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; explicit environment always wins.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            input_table: require(&lookup, ENV_INPUT_TABLE)?,
            cleanup_table: require(&lookup, ENV_CLEANUP_TABLE)?,
            artifact_bucket: require(&lookup, ENV_ARTIFACT_BUCKET)?,
            execution_role: require(&lookup, ENV_EXECUTION_ROLE)?,
            webhook_param: lookup(ENV_WEBHOOK_PARAM).filter(|v| !v.is_empty()),
            region: lookup(ENV_REGION).filter(|v| !v.is_empty()),
        })
    }
}

/// Fetches a required variable through the lookup.
fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String> {
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar {
            name: name.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn full_vars() -> HashMap<String, String> {
        vars(&[
            (ENV_INPUT_TABLE, "inventory"),
            (ENV_CLEANUP_TABLE, "cleanup"),
            (ENV_ARTIFACT_BUCKET, "backups"),
            (ENV_EXECUTION_ROLE, "cleanup-exec"),
            (ENV_WEBHOOK_PARAM, "/cleanup/webhook"),
            (ENV_REGION, "eu-west-1"),
        ])
    }

    #[test]
    fn test_full_settings() {
        let env = full_vars();
        let settings = Settings::from_lookup(|n| env.get(n).cloned())
            .expect("settings should load");

        assert_eq!(settings.input_table, "inventory");
        assert_eq!(settings.cleanup_table, "cleanup");
        assert_eq!(settings.artifact_bucket, "backups");
        assert_eq!(settings.execution_role, "cleanup-exec");
        assert_eq!(settings.webhook_param.as_deref(), Some("/cleanup/webhook"));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_webhook_and_region_optional() {
        let mut env = full_vars();
        env.remove(ENV_WEBHOOK_PARAM);
        env.remove(ENV_REGION);

        let settings = Settings::from_lookup(|n| env.get(n).cloned())
            .expect("settings should load");

        assert!(settings.webhook_param.is_none());
        assert!(settings.region.is_none());
    }

    #[test]
    fn test_missing_required_variable() {
        let mut env = full_vars();
        env.remove(ENV_CLEANUP_TABLE);

        let result = Settings::from_lookup(|n| env.get(n).cloned());
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut env = full_vars();
        env.insert(ENV_ARTIFACT_BUCKET.to_string(), String::new());

        let result = Settings::from_lookup(|n| env.get(n).cloned());
        assert!(result.is_err());
    }
}
