//! Quarantine: back up and disable every unused role in a plan.
//!
//! Per role the order is fixed: read the current trust policy, store a
//! gzipped copy in the artifact bucket, then replace the policy with a
//! deny-all document, then write the quarantine record. The backup must
//! land before the deny so a mistaken quarantine is always reversible
//! from the recorded location. A plan advances to `quarantined` only
//! once every one of its unused roles went through all four steps.

use serde::Serialize;
use tracing::{info, warn};

use crate::cloud::{deny_all_trust_policy, ArtifactStore, CloudClients, SessionBroker};
use crate::error::Result;
use crate::store::types::{PlanState, RoleQuarantineRecord, StackKey};
use crate::store::CleanupStore;

use super::{AccountFailure, PhaseInput, Sessions};

/// Outcome of one quarantine run.
#[derive(Debug, Serialize)]
pub struct QuarantineReport {
    /// Stacks whose plan advanced to `quarantined` this run.
    pub quarantined: Vec<StackKey>,
    /// Accounts whose session could not be established.
    pub failed_accounts: Vec<AccountFailure>,
    /// Stacks where at least one role failed; the plan stays `planned`
    /// and the next run retries.
    pub failed_stacks: Vec<FailedStack>,
}

/// A stack that did not fully quarantine.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FailedStack {
    /// The stack.
    pub key: StackKey,
    /// The role that failed and why.
    pub reason: String,
}

/// The quarantine phase.
pub struct Quarantine<'a> {
    store: &'a dyn CleanupStore,
    broker: &'a dyn SessionBroker,
    artifacts: &'a dyn ArtifactStore,
}

impl<'a> Quarantine<'a> {
    /// Creates the phase over its collaborators.
    #[must_use]
    pub fn new(
        store: &'a dyn CleanupStore,
        broker: &'a dyn SessionBroker,
        artifacts: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            store,
            broker,
            artifacts,
        }
    }

    /// Runs the phase for the input accounts.
    pub async fn run(&self, input: &PhaseInput) -> Result<QuarantineReport> {
        // Prepared-but-unexecuted plans are selected too: re-quarantining
        // them re-backs-up and re-denies, and refinement re-stages after.
        let plans = self
            .store
            .plans_in_states(
                &input.accounts,
                &[PlanState::Planned, PlanState::ChangesetPrepared],
            )
            .await?;
        info!(count = plans.len(), "Quarantining planned stacks");

        let mut sessions = Sessions::new(self.broker);
        let mut quarantined = Vec::new();
        let mut failed_stacks = Vec::new();

        for plan in plans {
            let Some(clients) = sessions.get(&plan.key.account).await else {
                continue;
            };

            match self
                .quarantine_stack(&clients, &plan.key, &plan.unused_roles, input.run_id())
                .await
            {
                Ok(()) => {
                    self.store
                        .advance_plan(&plan.key, PlanState::Quarantined)
                        .await?;
                    info!(stack = %plan.key, roles = plan.unused_roles.len(), "Stack quarantined");
                    quarantined.push(plan.key);
                }
                Err(e) => {
                    warn!(stack = %plan.key, error = %e, "Stack quarantine incomplete");
                    failed_stacks.push(FailedStack {
                        key: plan.key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(QuarantineReport {
            quarantined,
            failed_accounts: sessions.failures(),
            failed_stacks,
        })
    }

    async fn quarantine_stack(
        &self,
        clients: &CloudClients,
        key: &StackKey,
        roles: &[String],
        run_id: &str,
    ) -> Result<()> {
        for role in roles {
            let policy = clients.identity.trust_policy(role).await?;

            let backup_key = backup_key(run_id, key, role);
            let location = self
                .artifacts
                .put_compressed_json(&backup_key, &policy)
                .await?;

            clients
                .identity
                .set_trust_policy(role, &deny_all_trust_policy())
                .await?;

            self.store
                .put_role_record(key, &RoleQuarantineRecord::quarantined(role, location))
                .await?;
        }
        Ok(())
    }
}

/// Object key for one role's trust-policy backup.
fn backup_key(run_id: &str, key: &StackKey, role: &str) -> String {
    format!(
        "part2/{run_id}/backups/{}-{}-{role}.json.gz",
        key.account, key.stack
    )
}
