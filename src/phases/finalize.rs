//! Finalize: settle executed plans into their terminal state.
//!
//! Pure state-store reconciliation, no cloud calls. Each execution
//! record's action determines the terminal plan state: `deleted` for a
//! stack deletion, `completed` for a change set. The recorded stack
//! status travels along in the report so failure and rollback statuses
//! reach the operator through the notification, but they do not block
//! finalization; the workflow records cloud truth rather than asserting
//! success.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::types::{ExecutionRecord, PlanState, StackKey};
use crate::store::CleanupStore;

use super::PhaseInput;

/// Outcome of one finalize run.
#[derive(Debug, Serialize)]
pub struct FinalizeReport {
    /// Plans moved to a terminal state.
    pub finalized: Vec<FinalizedStack>,
}

/// One plan settled into its terminal state.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FinalizedStack {
    /// The stack.
    pub key: StackKey,
    /// The terminal state written.
    pub state: PlanState,
    /// The terminal stack status the executor recorded.
    pub status: String,
}

/// The finalization phase.
pub struct Finalizer<'a> {
    store: &'a dyn CleanupStore,
}

impl<'a> Finalizer<'a> {
    /// Creates the phase over the cleanup store.
    #[must_use]
    pub fn new(store: &'a dyn CleanupStore) -> Self {
        Self { store }
    }

    /// Runs the phase for the input accounts.
    pub async fn run(&self, input: &PhaseInput) -> Result<FinalizeReport> {
        let plans = self
            .store
            .plans_in_states(&input.accounts, &[PlanState::Executed])
            .await?;
        info!(count = plans.len(), "Finalizing executed stacks");

        let executions: HashMap<StackKey, ExecutionRecord> = self
            .store
            .executions(&input.accounts)
            .await?
            .into_iter()
            .collect();

        let mut finalized = Vec::new();

        for plan in plans {
            let Some(record) = executions.get(&plan.key) else {
                warn!(stack = %plan.key, "Executed plan has no execution record, leaving as-is");
                continue;
            };

            let state = record.action.final_state();
            self.store.advance_plan(&plan.key, state).await?;
            info!(stack = %plan.key, %state, status = %record.status, "Plan finalized");
            finalized.push(FinalizedStack {
                key: plan.key,
                state,
                status: record.status.clone(),
            });
        }

        Ok(FinalizeReport { finalized })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::types::{ExecutionAction, Plan, PlanMode};
    use crate::store::MemoryStore;

    use super::*;

    fn key(stack: &str) -> StackKey {
        StackKey::new("111111111111", stack)
    }

    async fn seed_executed(store: &MemoryStore, stack: &str, action: ExecutionAction, status: &str) {
        let mut plan = Plan::new(key(stack), PlanMode::Mixed, vec!["r".to_string()], Vec::new());
        plan.state = PlanState::Executed;
        store.put_plan(&plan).await.expect("seed plan");
        store
            .put_execution(&key(stack), &ExecutionRecord::new(action, status))
            .await
            .expect("seed execution");
    }

    fn input() -> PhaseInput {
        PhaseInput::new(vec!["111111111111".to_string()])
    }

    #[tokio::test]
    async fn test_deleted_stack_finalizes_to_deleted() {
        let store = MemoryStore::default();
        seed_executed(&store, "svc-a", ExecutionAction::DeleteStack, "DELETE_COMPLETE").await;
        let phase = Finalizer::new(&store);

        let report = phase.run(&input()).await.expect("finalize should succeed");

        assert_eq!(
            report.finalized,
            vec![FinalizedStack {
                key: key("svc-a"),
                state: PlanState::Deleted,
                status: "DELETE_COMPLETE".to_string(),
            }]
        );
        assert_eq!(
            store.plan(&key("svc-a")).expect("plan exists").state,
            PlanState::Deleted
        );
    }

    #[tokio::test]
    async fn test_change_set_finalizes_to_completed() {
        let store = MemoryStore::default();
        seed_executed(
            &store,
            "svc-b",
            ExecutionAction::ExecuteChangeset,
            "UPDATE_COMPLETE",
        )
        .await;
        let phase = Finalizer::new(&store);

        let report = phase.run(&input()).await.expect("finalize should succeed");

        assert_eq!(report.finalized[0].state, PlanState::Completed);
        assert_eq!(
            store.plan(&key("svc-b")).expect("plan exists").state,
            PlanState::Completed
        );
    }

    #[tokio::test]
    async fn test_rollback_status_still_settles_and_is_reported() {
        let store = MemoryStore::default();
        seed_executed(
            &store,
            "svc-b",
            ExecutionAction::ExecuteChangeset,
            "UPDATE_ROLLBACK_COMPLETE",
        )
        .await;
        let phase = Finalizer::new(&store);

        let report = phase.run(&input()).await.expect("finalize should succeed");

        assert_eq!(report.finalized[0].state, PlanState::Completed);
        assert_eq!(report.finalized[0].status, "UPDATE_ROLLBACK_COMPLETE");
    }

    #[tokio::test]
    async fn test_missing_record_leaves_plan_executed() {
        let store = MemoryStore::default();
        let mut plan = Plan::new(key("svc-b"), PlanMode::Mixed, vec!["r".to_string()], Vec::new());
        plan.state = PlanState::Executed;
        store.put_plan(&plan).await.expect("seed plan");
        let phase = Finalizer::new(&store);

        let report = phase.run(&input()).await.expect("finalize should succeed");

        assert!(report.finalized.is_empty());
        assert_eq!(
            store.plan(&key("svc-b")).expect("plan exists").state,
            PlanState::Executed
        );
    }

    #[tokio::test]
    async fn test_rerun_is_a_no_op() {
        let store = MemoryStore::default();
        seed_executed(&store, "svc-a", ExecutionAction::DeleteStack, "DELETE_COMPLETE").await;
        let phase = Finalizer::new(&store);

        phase.run(&input()).await.expect("first run");
        let report = phase.run(&input()).await.expect("second run");

        assert!(report.finalized.is_empty());
        assert_eq!(
            store.plan(&key("svc-a")).expect("plan exists").state,
            PlanState::Deleted
        );
    }
}
