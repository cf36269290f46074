//! Store trait definitions.
//!
//! Two traits split the durable state by ownership: [`InventoryStore`]
//! is the upstream classification data this system only reads, and
//! [`CleanupStore`] is the cleanup-state table this system owns and
//! mutates. Phases receive them as injected collaborators.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{
    ExecutionRecord, ExecutionTarget, Plan, PlanState, RoleClassification,
    RoleQuarantineRecord, StackKey, StackSummary,
};

/// Read-only access to the upstream inventory table.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Lists per-stack summaries belonging to the given accounts.
    async fn stack_summaries(&self, accounts: &[String]) -> Result<Vec<StackSummary>>;

    /// Lists the per-role classifications of one stack.
    async fn role_classifications(&self, key: &StackKey) -> Result<Vec<RoleClassification>>;
}

/// Access to the cleanup-state table owned by this system.
///
/// All writes are idempotent overwrites; the workflow relies on them
/// instead of locks or transactions.
#[async_trait]
pub trait CleanupStore: Send + Sync {
    /// Lists plans of the given accounts whose lifecycle state is in
    /// `states`.
    async fn plans_in_states(
        &self,
        accounts: &[String],
        states: &[PlanState],
    ) -> Result<Vec<Plan>>;

    /// Writes (or overwrites) a plan.
    async fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Advances a plan's lifecycle state and refreshes its timestamp.
    async fn advance_plan(&self, key: &StackKey, state: PlanState) -> Result<()>;

    /// Stores the refinement decision on a plan: the execution target and
    /// the `changeset-prepared` state, in one write.
    async fn prepare_execution(&self, key: &StackKey, target: &ExecutionTarget) -> Result<()>;

    /// Writes (or overwrites) a per-role quarantine record.
    async fn put_role_record(
        &self,
        key: &StackKey,
        record: &RoleQuarantineRecord,
    ) -> Result<()>;

    /// Writes (or overwrites) the execution record of a stack.
    async fn put_execution(&self, key: &StackKey, record: &ExecutionRecord) -> Result<()>;

    /// Lists execution records belonging to the given accounts.
    async fn executions(&self, accounts: &[String]) -> Result<Vec<(StackKey, ExecutionRecord)>>;
}
