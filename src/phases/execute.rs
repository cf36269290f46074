//! Execute: carry out the staged action and wait for a terminal status.
//!
//! Deletions and change-set executions are both fire-then-poll: start
//! the operation, then describe the stack on a fixed interval until the
//! status is terminal or the stack is gone. An operation left in flight
//! by an interrupted run is re-observed rather than re-fired. A failed
//! or rolled-back status is recorded as the outcome, not raised; the
//! finalizer decides what it means.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::cloud::{CloudClients, SessionBroker};
use crate::error::Result;
use crate::store::types::{ExecutionAction, ExecutionRecord, PlanState, StackKey};
use crate::store::CleanupStore;

use super::{AccountFailure, PhaseInput, Sessions};

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Status recorded when a deleted stack can no longer be described.
const STATUS_GONE: &str = "DELETE_COMPLETE";

/// Outcome of one execution run.
#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    /// Stacks executed this run with their terminal status.
    pub executed: Vec<ExecutedStack>,
    /// Accounts whose session could not be established.
    pub failed_accounts: Vec<AccountFailure>,
}

/// One executed stack operation.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ExecutedStack {
    /// The stack.
    pub key: StackKey,
    /// What was executed.
    pub action: ExecutionAction,
    /// The terminal stack status observed.
    pub status: String,
}

/// The execution phase.
pub struct Executor<'a> {
    store: &'a dyn CleanupStore,
    broker: &'a dyn SessionBroker,
    poll_interval: Duration,
}

impl<'a> Executor<'a> {
    /// Creates the phase over its collaborators.
    #[must_use]
    pub fn new(store: &'a dyn CleanupStore, broker: &'a dyn SessionBroker) -> Self {
        Self {
            store,
            broker,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the status polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the phase for the input accounts.
    pub async fn run(&self, input: &PhaseInput) -> Result<ExecutionReport> {
        let plans = self
            .store
            .plans_in_states(&input.accounts, &[PlanState::ChangesetPrepared])
            .await?;
        info!(count = plans.len(), "Executing prepared stacks");

        let mut sessions = Sessions::new(self.broker);
        let mut executed = Vec::new();

        for plan in plans {
            let Some(clients) = sessions.get(&plan.key.account).await else {
                continue;
            };

            let action = if plan.delete_stack {
                ExecutionAction::DeleteStack
            } else {
                ExecutionAction::ExecuteChangeset
            };

            // A previous run may have started the operation before being
            // interrupted; the change set is consumed at that point, so
            // resume the wait instead of re-firing.
            let in_flight = matches!(
                clients.stacks.stack_status(&plan.key.stack).await?,
                Some(ref status) if !status.is_terminal()
            );
            if in_flight {
                info!(stack = %plan.key, %action, "Operation already in progress, resuming");
            } else if plan.delete_stack {
                clients.stacks.delete_stack(&plan.key.stack).await?;
            } else {
                clients
                    .stacks
                    .execute_change_set(&plan.key.stack, &plan.change_set_name)
                    .await?;
            }

            let status = self.await_terminal(&clients, &plan.key.stack).await?;
            info!(stack = %plan.key, %action, %status, "Stack operation finished");

            self.store
                .put_execution(&plan.key, &ExecutionRecord::new(action, &status))
                .await?;
            self.store
                .advance_plan(&plan.key, PlanState::Executed)
                .await?;

            executed.push(ExecutedStack {
                key: plan.key,
                action,
                status,
            });
        }

        Ok(ExecutionReport {
            executed,
            failed_accounts: sessions.failures(),
        })
    }

    /// Polls until the stack reaches a terminal status or disappears.
    async fn await_terminal(&self, clients: &CloudClients, stack: &str) -> Result<String> {
        loop {
            match clients.stacks.stack_status(stack).await? {
                None => return Ok(STATUS_GONE.to_string()),
                Some(status) if status.is_terminal() => return Ok(status.0),
                Some(status) => {
                    debug!(stack, %status, "Stack operation in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::cloud::{MockIdentityService, MockStackService, StackStatus};
    use crate::phases::testkit::FakeBroker;
    use crate::store::types::{Plan, PlanMode, CHANGE_SET_NONE};
    use crate::store::MemoryStore;

    use super::*;

    fn key(stack: &str) -> StackKey {
        StackKey::new("111111111111", stack)
    }

    async fn seed_prepared(store: &MemoryStore, stack: &str, change_set: Option<&str>) {
        let mut plan = Plan::new(key(stack), PlanMode::Mixed, vec!["r".to_string()], Vec::new());
        plan.state = PlanState::ChangesetPrepared;
        match change_set {
            Some(name) => {
                plan.change_set_name = name.to_string();
                plan.delete_stack = false;
            }
            None => {
                plan.change_set_name = CHANGE_SET_NONE.to_string();
                plan.delete_stack = true;
            }
        }
        store.put_plan(&plan).await.expect("seed plan");
    }

    fn input() -> PhaseInput {
        PhaseInput::new(vec!["111111111111".to_string()])
    }

    #[tokio::test]
    async fn test_delete_polls_until_stack_is_gone() {
        let store = MemoryStore::default();
        seed_prepared(&store, "svc-a", None).await;

        let mut stacks = MockStackService::new();
        stacks
            .expect_delete_stack()
            .withf(|stack| stack == "svc-a")
            .times(1)
            .returning(|_| Ok(()));
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_in_mock = polls.clone();
        stacks.expect_stack_status().returning(move |_| {
            match polls_in_mock.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(Some(StackStatus("CREATE_COMPLETE".to_string()))),
                1 => Ok(Some(StackStatus("DELETE_IN_PROGRESS".to_string()))),
                _ => Ok(None),
            }
        });

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Executor::new(&store, &broker).with_poll_interval(Duration::from_millis(1));

        let report = phase.run(&input()).await.expect("execute should succeed");

        assert_eq!(
            report.executed,
            vec![ExecutedStack {
                key: key("svc-a"),
                action: ExecutionAction::DeleteStack,
                status: "DELETE_COMPLETE".to_string(),
            }]
        );
        assert_eq!(polls.load(Ordering::SeqCst), 3);

        let plan = store.plan(&key("svc-a")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Executed);
        let record = store.execution(&key("svc-a")).expect("record written");
        assert_eq!(record.action, ExecutionAction::DeleteStack);
        assert_eq!(record.status, "DELETE_COMPLETE");
    }

    #[tokio::test]
    async fn test_change_set_execution_records_terminal_status() {
        let store = MemoryStore::default();
        seed_prepared(&store, "svc-b", Some("remove-unused-20240601123045")).await;

        let mut stacks = MockStackService::new();
        stacks
            .expect_execute_change_set()
            .withf(|stack, name| stack == "svc-b" && name == "remove-unused-20240601123045")
            .times(1)
            .returning(|_, _| Ok(()));
        stacks
            .expect_stack_status()
            .returning(|_| Ok(Some(StackStatus("UPDATE_COMPLETE".to_string()))));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Executor::new(&store, &broker).with_poll_interval(Duration::from_millis(1));

        let report = phase.run(&input()).await.expect("execute should succeed");

        assert_eq!(report.executed[0].action, ExecutionAction::ExecuteChangeset);
        assert_eq!(report.executed[0].status, "UPDATE_COMPLETE");
        let plan = store.plan(&key("svc-b")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Executed);
    }

    #[tokio::test]
    async fn test_in_progress_stack_resumes_without_refiring() {
        let store = MemoryStore::default();
        seed_prepared(&store, "svc-b", Some("remove-unused-20240601123045")).await;

        // An earlier run was interrupted after consuming the change set;
        // the stack is mid-update and the plan still reads as prepared.
        let mut stacks = MockStackService::new();
        stacks.expect_execute_change_set().times(0);
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_in_mock = polls.clone();
        stacks.expect_stack_status().returning(move |_| {
            match polls_in_mock.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Ok(Some(StackStatus("UPDATE_IN_PROGRESS".to_string()))),
                _ => Ok(Some(StackStatus("UPDATE_COMPLETE".to_string()))),
            }
        });

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Executor::new(&store, &broker).with_poll_interval(Duration::from_millis(1));

        let report = phase.run(&input()).await.expect("execute should resume");

        assert_eq!(report.executed[0].action, ExecutionAction::ExecuteChangeset);
        assert_eq!(report.executed[0].status, "UPDATE_COMPLETE");
        let plan = store.plan(&key("svc-b")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Executed);
    }

    #[tokio::test]
    async fn test_rollback_is_recorded_not_raised() {
        let store = MemoryStore::default();
        seed_prepared(&store, "svc-b", Some("remove-unused-20240601123045")).await;

        let mut stacks = MockStackService::new();
        stacks.expect_execute_change_set().returning(|_, _| Ok(()));
        stacks
            .expect_stack_status()
            .returning(|_| Ok(Some(StackStatus("UPDATE_ROLLBACK_COMPLETE".to_string()))));

        let broker = FakeBroker::default().with_account(
            "111111111111",
            Arc::new(stacks),
            Arc::new(MockIdentityService::new()),
        );
        let phase = Executor::new(&store, &broker).with_poll_interval(Duration::from_millis(1));

        let report = phase.run(&input()).await.expect("execute should succeed");

        assert_eq!(report.executed[0].status, "UPDATE_ROLLBACK_COMPLETE");
        let record = store.execution(&key("svc-b")).expect("record written");
        assert_eq!(record.status, "UPDATE_ROLLBACK_COMPLETE");
        // The plan still advances; the status reaches the operator
        // through the report.
        let plan = store.plan(&key("svc-b")).expect("plan exists");
        assert_eq!(plan.state, PlanState::Executed);
    }

    #[tokio::test]
    async fn test_unreachable_account_skips_all_its_stacks() {
        let store = MemoryStore::default();
        seed_prepared(&store, "svc-a", None).await;
        seed_prepared(&store, "svc-b", Some("remove-unused-20240601123045")).await;

        let broker = FakeBroker::default();
        let phase = Executor::new(&store, &broker).with_poll_interval(Duration::from_millis(1));

        let report = phase.run(&input()).await.expect("phase itself succeeds");

        assert!(report.executed.is_empty());
        assert_eq!(report.failed_accounts.len(), 1);
        assert_eq!(
            store.plan(&key("svc-a")).expect("plan exists").state,
            PlanState::ChangesetPrepared
        );
    }
}
