//! Planner: derives cleanup plans from the upstream inventory.
//!
//! For each stack summarized as `all-unused` or `mixed`, the planner
//! reads the per-role usage classifications and writes a plan in state
//! `planned`. Stacks still `pending` or entirely `all-used` produce no
//! plan. Stacks whose plan has already advanced beyond `planned` are
//! left untouched so a re-run never rewinds the lifecycle.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::store::types::{Plan, PlanMode, PlanState, RoleUsage, StackKey, SummaryState};
use crate::store::{CleanupStore, InventoryStore};

use super::PhaseInput;

/// Outcome of one planner run.
#[derive(Debug, Serialize)]
pub struct PlannerReport {
    /// Stacks for which a plan was written this run.
    pub planned: Vec<StackKey>,
    /// Stacks seen in the inventory but not planned, with the reason.
    pub skipped: Vec<SkippedStack>,
}

/// A stack the planner looked at and left alone.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SkippedStack {
    /// The stack.
    pub key: StackKey,
    /// Why no plan was written.
    pub reason: SkipReason,
}

/// Reason a stack was not planned.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The summary is not in a plannable state.
    NotEligible,
    /// A plan already advanced past `planned`.
    AlreadyAdvanced,
    /// Classification rows list no unused role.
    NoUnusedRoles,
}

/// The planning phase.
pub struct Planner<'a> {
    inventory: &'a dyn InventoryStore,
    cleanup: &'a dyn CleanupStore,
}

impl<'a> Planner<'a> {
    /// Creates a planner over the two stores.
    #[must_use]
    pub fn new(inventory: &'a dyn InventoryStore, cleanup: &'a dyn CleanupStore) -> Self {
        Self { inventory, cleanup }
    }

    /// Runs the phase for the input accounts.
    pub async fn run(&self, input: &PhaseInput) -> Result<PlannerReport> {
        let summaries = self.inventory.stack_summaries(&input.accounts).await?;
        info!(count = summaries.len(), "Planning from inventory summaries");

        let advanced: HashSet<StackKey> = self
            .cleanup
            .plans_in_states(&input.accounts, &PlanState::ALL)
            .await?
            .into_iter()
            .filter(|plan| plan.state != PlanState::Planned)
            .map(|plan| plan.key)
            .collect();

        let mut planned = Vec::new();
        let mut skipped = Vec::new();

        for summary in summaries {
            let mode = match summary.state {
                SummaryState::AllUnused => PlanMode::AllUnused,
                SummaryState::Mixed => PlanMode::Mixed,
                SummaryState::Pending | SummaryState::AllUsed => {
                    skipped.push(SkippedStack {
                        key: summary.key,
                        reason: SkipReason::NotEligible,
                    });
                    continue;
                }
            };

            if advanced.contains(&summary.key) {
                debug!(stack = %summary.key, "Plan already advanced, leaving as-is");
                skipped.push(SkippedStack {
                    key: summary.key,
                    reason: SkipReason::AlreadyAdvanced,
                });
                continue;
            }

            let classifications = self.inventory.role_classifications(&summary.key).await?;
            let mut unused = Vec::new();
            let mut used = Vec::new();
            for row in classifications {
                match row.usage {
                    RoleUsage::Unused => unused.push(row.role),
                    RoleUsage::Used => used.push(row.role),
                }
            }
            unused.sort();
            used.sort();

            if unused.is_empty() {
                skipped.push(SkippedStack {
                    key: summary.key,
                    reason: SkipReason::NoUnusedRoles,
                });
                continue;
            }

            let plan = Plan::new(summary.key.clone(), mode, unused, used);
            self.cleanup.put_plan(&plan).await?;
            info!(stack = %summary.key, mode = %mode, "Wrote plan");
            planned.push(summary.key);
        }

        Ok(PlannerReport { planned, skipped })
    }
}
