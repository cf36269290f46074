//! In-memory store backend.
//!
//! Holds the same records as the DynamoDB backend behind the same traits.
//! Used for offline rehearsal of the workflow and throughout the test
//! suite; a phase exercised against this backend observes the same
//! selection and overwrite semantics as against the real table.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, StoreError};

use super::store::{CleanupStore, InventoryStore};
use super::types::{
    ExecutionRecord, ExecutionTarget, Plan, PlanState, RoleClassification,
    RoleQuarantineRecord, StackKey, StackSummary,
};

/// In-memory implementation of both store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    summaries: Mutex<Vec<StackSummary>>,
    classifications: Mutex<HashMap<StackKey, Vec<RoleClassification>>>,
    plans: Mutex<HashMap<StackKey, Plan>>,
    role_records: Mutex<HashMap<(StackKey, String), RoleQuarantineRecord>>,
    executions: Mutex<HashMap<StackKey, ExecutionRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an upstream stack summary.
    pub fn insert_summary(&self, summary: StackSummary) {
        self.lock_summaries().push(summary);
    }

    /// Seeds the role classifications of one stack.
    pub fn insert_classifications(&self, key: StackKey, roles: Vec<RoleClassification>) {
        self.lock_classifications().insert(key, roles);
    }

    /// Returns a copy of the stored plan for a stack, if any.
    #[must_use]
    pub fn plan(&self, key: &StackKey) -> Option<Plan> {
        self.lock_plans().get(key).cloned()
    }

    /// Returns a copy of a role's quarantine record, if any.
    #[must_use]
    pub fn role_record(&self, key: &StackKey, role: &str) -> Option<RoleQuarantineRecord> {
        self.lock_role_records()
            .get(&(key.clone(), role.to_string()))
            .cloned()
    }

    /// Returns a copy of a stack's execution record, if any.
    #[must_use]
    pub fn execution(&self, key: &StackKey) -> Option<ExecutionRecord> {
        self.lock_executions().get(key).cloned()
    }

    fn lock_summaries(&self) -> std::sync::MutexGuard<'_, Vec<StackSummary>> {
        self.summaries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_classifications(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<StackKey, Vec<RoleClassification>>> {
        self.classifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_plans(&self) -> std::sync::MutexGuard<'_, HashMap<StackKey, Plan>> {
        self.plans.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_role_records(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(StackKey, String), RoleQuarantineRecord>> {
        self.role_records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_executions(&self) -> std::sync::MutexGuard<'_, HashMap<StackKey, ExecutionRecord>> {
        self.executions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn stack_summaries(&self, accounts: &[String]) -> Result<Vec<StackSummary>> {
        Ok(self
            .lock_summaries()
            .iter()
            .filter(|s| accounts.contains(&s.key.account))
            .cloned()
            .collect())
    }

    async fn role_classifications(&self, key: &StackKey) -> Result<Vec<RoleClassification>> {
        Ok(self
            .lock_classifications()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CleanupStore for MemoryStore {
    async fn plans_in_states(
        &self,
        accounts: &[String],
        states: &[PlanState],
    ) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .lock_plans()
            .values()
            .filter(|p| accounts.contains(&p.key.account) && states.contains(&p.state))
            .cloned()
            .collect();
        // Deterministic enumeration order for the sequential pass.
        plans.sort_by(|a, b| a.key.partition_key().cmp(&b.key.partition_key()));
        Ok(plans)
    }

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.lock_plans().insert(plan.key.clone(), plan.clone());
        Ok(())
    }

    async fn advance_plan(&self, key: &StackKey, state: PlanState) -> Result<()> {
        let mut plans = self.lock_plans();
        let plan = plans.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.partition_key(),
        })?;
        plan.state = state;
        plan.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn prepare_execution(&self, key: &StackKey, target: &ExecutionTarget) -> Result<()> {
        let mut plans = self.lock_plans();
        let plan = plans.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.partition_key(),
        })?;
        plan.delete_stack = target.is_delete();
        plan.change_set_name = target.change_set_name().to_string();
        plan.state = PlanState::ChangesetPrepared;
        plan.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn put_role_record(
        &self,
        key: &StackKey,
        record: &RoleQuarantineRecord,
    ) -> Result<()> {
        self.lock_role_records()
            .insert((key.clone(), record.role.clone()), record.clone());
        Ok(())
    }

    async fn put_execution(&self, key: &StackKey, record: &ExecutionRecord) -> Result<()> {
        self.lock_executions().insert(key.clone(), record.clone());
        Ok(())
    }

    async fn executions(&self, accounts: &[String]) -> Result<Vec<(StackKey, ExecutionRecord)>> {
        let mut records: Vec<(StackKey, ExecutionRecord)> = self
            .lock_executions()
            .iter()
            .filter(|(key, _)| accounts.contains(&key.account))
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        records.sort_by(|a, b| a.0.partition_key().cmp(&b.0.partition_key()));
        Ok(records)
    }
}
