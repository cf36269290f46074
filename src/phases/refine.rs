//! Refine: turn each quarantined plan into a concrete execution target.
//!
//! An `all-unused` plan is marked for whole-stack deletion without
//! touching the account. A `mixed` plan needs template surgery: fetch
//! the original template, drop the unused IAM role resources, and stage
//! an update change set. Stacks whose template cannot be edited (not
//! JSON, or not retrievable) stay `quarantined`; the roles remain
//! denied, which is the safe resting state.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cloud::{CloudClients, SessionBroker};
use crate::error::Result;
use crate::store::types::{ExecutionTarget, Plan, PlanState, StackKey};
use crate::store::CleanupStore;
use crate::template::{removal_set, StackTemplate};

use super::{AccountFailure, PhaseInput, Sessions};

/// Outcome of one refine run.
#[derive(Debug, Serialize)]
pub struct RefineReport {
    /// Per-stack refinement decisions.
    pub plans: Vec<RefinedPlan>,
    /// Accounts whose session could not be established.
    pub failed_accounts: Vec<AccountFailure>,
}

/// The decision made for one quarantined stack.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RefinedPlan {
    /// The stack.
    pub key: StackKey,
    /// What the executor will do, or why nothing was staged.
    pub outcome: RefineOutcome,
}

/// Refinement decision.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "change_set")]
pub enum RefineOutcome {
    /// The whole stack will be deleted.
    DeleteStack,
    /// An update change set was staged under this name.
    Changeset(String),
    /// No editable JSON template; the stack stays quarantined.
    SkipNoTemplate,
    /// No unused role maps to a template resource; the stack stays
    /// quarantined.
    NoUnusedLogicals,
}

/// The refinement phase.
pub struct Refine<'a> {
    store: &'a dyn CleanupStore,
    broker: &'a dyn SessionBroker,
}

impl<'a> Refine<'a> {
    /// Creates the phase over its collaborators.
    #[must_use]
    pub fn new(store: &'a dyn CleanupStore, broker: &'a dyn SessionBroker) -> Self {
        Self { store, broker }
    }

    /// Runs the phase for the input accounts.
    pub async fn run(&self, input: &PhaseInput) -> Result<RefineReport> {
        let plans = self
            .store
            .plans_in_states(&input.accounts, &[PlanState::Quarantined])
            .await?;
        info!(count = plans.len(), "Refining quarantined stacks");

        let mut sessions = Sessions::new(self.broker);
        let mut refined = Vec::new();

        for plan in plans {
            if plan.delete_stack {
                self.store
                    .prepare_execution(&plan.key, &ExecutionTarget::DeleteStack)
                    .await?;
                info!(stack = %plan.key, "Marked for stack deletion");
                refined.push(RefinedPlan {
                    key: plan.key,
                    outcome: RefineOutcome::DeleteStack,
                });
                continue;
            }

            let Some(clients) = sessions.get(&plan.key.account).await else {
                continue;
            };

            let outcome = self.refine_mixed(&clients, &plan).await?;
            match &outcome {
                RefineOutcome::Changeset(name) => {
                    self.store
                        .prepare_execution(&plan.key, &ExecutionTarget::ChangeSet(name.clone()))
                        .await?;
                    info!(stack = %plan.key, change_set = %name, "Staged change set");
                }
                RefineOutcome::SkipNoTemplate | RefineOutcome::NoUnusedLogicals => {
                    warn!(stack = %plan.key, ?outcome, "Stack stays quarantined");
                }
                RefineOutcome::DeleteStack => unreachable!("handled above"),
            }
            refined.push(RefinedPlan {
                key: plan.key,
                outcome,
            });
        }

        Ok(RefineReport {
            plans: refined,
            failed_accounts: sessions.failures(),
        })
    }

    async fn refine_mixed(&self, clients: &CloudClients, plan: &Plan) -> Result<RefineOutcome> {
        let Some(body) = clients.stacks.original_template(&plan.key.stack).await? else {
            return Ok(RefineOutcome::SkipNoTemplate);
        };
        let Some(mut template) = StackTemplate::parse(&body) else {
            return Ok(RefineOutcome::SkipNoTemplate);
        };

        let resources = clients.stacks.stack_resources(&plan.key.stack).await?;
        let unused: HashSet<String> = plan.unused_roles.iter().cloned().collect();
        let logicals = removal_set(&resources, &unused, &template);
        if logicals.is_empty() {
            return Ok(RefineOutcome::NoUnusedLogicals);
        }

        for logical in &logicals {
            template.remove_resource(logical);
        }

        let name = change_set_name(Utc::now());
        clients
            .stacks
            .create_change_set(&plan.key.stack, &name, &template.to_body())
            .await?;

        Ok(RefineOutcome::Changeset(name))
    }
}

/// Timestamped change-set name.
fn change_set_name(now: chrono::DateTime<Utc>) -> String {
    format!("remove-unused-{}", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::cloud::{MockIdentityService, MockStackService, StackResource};
    use crate::phases::testkit::FakeBroker;
    use crate::store::types::{PlanMode, CHANGE_SET_NONE};
    use crate::store::MemoryStore;

    use super::*;

    fn key(stack: &str) -> StackKey {
        StackKey::new("111111111111", stack)
    }

    async fn seed(store: &MemoryStore, stack: &str, mode: PlanMode, unused: &[&str]) {
        let mut plan = Plan::new(
            key(stack),
            mode,
            unused.iter().map(ToString::to_string).collect(),
            Vec::new(),
        );
        plan.state = PlanState::Quarantined;
        store.put_plan(&plan).await.expect("seed plan");
    }

    fn input() -> PhaseInput {
        PhaseInput::new(vec!["111111111111".to_string()])
    }

    fn role_resource(logical: &str, physical: &str) -> StackResource {
        StackResource {
            logical_id: logical.to_string(),
            physical_id: Some(physical.to_string()),
            resource_type: "AWS::IAM::Role".to_string(),
        }
    }

    #[tokio::test]
    async fn test_all_unused_plan_is_marked_for_deletion() {
        let store = MemoryStore::default();
        seed(&store, "svc-a", PlanMode::AllUnused, &["svc-a-role-1"]).await;

        // No session is needed for the delete decision.
        let broker = FakeBroker::default();
        let phase = Refine::new(&store, &broker);

        let report = phase.run(&input()).await.expect("refine should succeed");

        assert_eq!(report.plans.len(), 1);
        assert_eq!(report.plans[0].outcome, RefineOutcome::DeleteStack);
        assert!(report.failed_accounts.is_empty());

        let plan = store.plan(&key("svc-a")).expect("plan exists");
        assert_eq!(plan.state, PlanState::ChangesetPrepared);
        assert!(plan.delete_stack);
        assert_eq!(plan.change_set_name, CHANGE_SET_NONE);
    }

    #[tokio::test]
    async fn test_mixed_plan_stages_change_set() {
        let store = MemoryStore::default();
        seed(&store, "svc-b", PlanMode::Mixed, &["svc-b-unused-role"]).await;

        let template = json!({
            "Resources": {
                "UnusedRole": {"Type": "AWS::IAM::Role"},
                "UsedRole": {"Type": "AWS::IAM::Role"},
                "Bucket": {"Type": "AWS::S3::Bucket"}
            }
        })
        .to_string();

        let mut stacks = MockStackService::new();
        stacks
            .expect_original_template()
            .returning(move |_| Ok(Some(template.clone())));
        stacks.expect_stack_resources().returning(|_| {
            Ok(vec![
                role_resource("UnusedRole", "svc-b-unused-role"),
                role_resource("UsedRole", "svc-b-used-role"),
            ])
        });
        stacks
            .expect_create_change_set()
            .withf(|stack, name, body| {
                stack == "svc-b"
                    && name.starts_with("remove-unused-")
                    && !body.contains("UnusedRole")
                    && body.contains("UsedRole")
                    && body.contains("Bucket")
            })
            .returning(|_, _, _| Ok(()));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Refine::new(&store, &broker);

        let report = phase.run(&input()).await.expect("refine should succeed");

        let RefineOutcome::Changeset(name) = &report.plans[0].outcome else {
            panic!("expected change set outcome, got {:?}", report.plans[0].outcome);
        };
        let plan = store.plan(&key("svc-b")).expect("plan exists");
        assert_eq!(plan.state, PlanState::ChangesetPrepared);
        assert_eq!(&plan.change_set_name, name);
        assert!(!plan.delete_stack);
    }

    #[tokio::test]
    async fn test_missing_template_stays_quarantined() {
        let store = MemoryStore::default();
        seed(&store, "svc-c", PlanMode::Mixed, &["svc-c-role"]).await;

        let mut stacks = MockStackService::new();
        stacks.expect_original_template().returning(|_| Ok(None));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Refine::new(&store, &broker);

        let report = phase.run(&input()).await.expect("refine should succeed");

        assert_eq!(report.plans[0].outcome, RefineOutcome::SkipNoTemplate);
        let plan = store.plan(&key("svc-c")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Quarantined);
    }

    #[tokio::test]
    async fn test_yaml_template_stays_quarantined() {
        let store = MemoryStore::default();
        seed(&store, "svc-c", PlanMode::Mixed, &["svc-c-role"]).await;

        let mut stacks = MockStackService::new();
        stacks
            .expect_original_template()
            .returning(|_| Ok(Some("Resources:\n  Role:\n    Type: AWS::IAM::Role".to_string())));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Refine::new(&store, &broker);

        let report = phase.run(&input()).await.expect("refine should succeed");

        assert_eq!(report.plans[0].outcome, RefineOutcome::SkipNoTemplate);
        let plan = store.plan(&key("svc-c")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Quarantined);
    }

    #[tokio::test]
    async fn test_no_matching_logicals_stays_quarantined() {
        let store = MemoryStore::default();
        seed(&store, "svc-b", PlanMode::Mixed, &["gone-role"]).await;

        let template = json!({"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}).to_string();
        let mut stacks = MockStackService::new();
        stacks
            .expect_original_template()
            .returning(move |_| Ok(Some(template.clone())));
        stacks.expect_stack_resources().returning(|_| Ok(Vec::new()));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Refine::new(&store, &broker);

        let report = phase.run(&input()).await.expect("refine should succeed");

        assert_eq!(report.plans[0].outcome, RefineOutcome::NoUnusedLogicals);
        let plan = store.plan(&key("svc-b")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Quarantined);
    }

    #[test]
    fn test_change_set_name_format() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-06-01T12:30:45+00:00")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(change_set_name(now), "remove-unused-20240601123045");
    }
}
