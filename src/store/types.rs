//! Entity types for the cleanup state machine.
//!
//! These types model the durable records of the workflow: the upstream
//! inventory rows (read-only), the per-stack [`Plan`], per-role
//! [`RoleQuarantineRecord`]s, and the [`ExecutionRecord`] written once a
//! stack reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort key of a stack plan item.
pub(crate) const PLAN_SORT_KEY: &str = "plan#stack";

/// Sort key of an execution record item.
pub(crate) const EXEC_SORT_KEY: &str = "exec#stack";

/// Sort key of an upstream stack summary item.
pub(crate) const SUMMARY_SORT_KEY: &str = "summary#stack";

/// Sort-key prefix of role items (both inventory classifications and
/// quarantine records).
pub(crate) const ROLE_SORT_PREFIX: &str = "role#";

/// Region scope the upstream inventory producer writes today.
pub(crate) const REGION_SCOPE: &str = "global";

/// Sentinel change-set name for plans that delete the whole stack.
pub const CHANGE_SET_NONE: &str = "N/A";

/// Composite key of a stack within an account.
///
/// The `account#stack` string form exists only at the store boundary;
/// everywhere else the two components travel as named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackKey {
    /// AWS account id.
    pub account: String,
    /// CloudFormation stack name.
    pub stack: String,
}

impl StackKey {
    /// Creates a new stack key.
    #[must_use]
    pub fn new(account: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            stack: stack.into(),
        }
    }

    /// Renders the cleanup-table partition key (`account#stack`).
    pub(crate) fn partition_key(&self) -> String {
        format!("{}#{}", self.account, self.stack)
    }

    /// Renders the inventory-table partition key for role rows
    /// (`account#<scope>#stack`).
    pub(crate) fn inventory_partition_key(&self) -> String {
        format!("{}#{REGION_SCOPE}#{}", self.account, self.stack)
    }

    /// Splits a cleanup-table partition key back into its components.
    pub(crate) fn from_partition_key(raw: &str) -> Result<Self, crate::error::StoreError> {
        raw.split_once('#')
            .map(|(account, stack)| Self::new(account, stack))
            .ok_or_else(|| crate::error::StoreError::MalformedKey {
                raw: raw.to_string(),
            })
    }
}

impl std::fmt::Display for StackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.stack)
    }
}

/// Aggregate classification of a stack's roles, as produced upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryState {
    /// Classification still running.
    Pending,
    /// Every role of the stack is unused.
    AllUnused,
    /// Some roles are used, some are not.
    Mixed,
    /// Every role is in use; nothing to clean up.
    AllUsed,
}

impl SummaryState {
    /// Parses the wire string written by the inventory producer.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "all-unused" => Some(Self::AllUnused),
            "mixed" => Some(Self::Mixed),
            "all-used" => Some(Self::AllUsed),
            _ => None,
        }
    }
}

/// An upstream per-stack summary row (read-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    /// The stack this summary describes.
    pub key: StackKey,
    /// Aggregate usage state.
    pub state: SummaryState,
}

/// Usage classification of a single role (read-only, from inventory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleUsage {
    /// The role has observed activity.
    Used,
    /// The role has no observed activity.
    Unused,
}

impl RoleUsage {
    /// Parses the wire string written by the inventory producer.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "used" => Some(Self::Used),
            "unused" => Some(Self::Unused),
            _ => None,
        }
    }
}

/// An upstream per-role classification row (read-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleClassification {
    /// Role name.
    pub role: String,
    /// Usage classification.
    pub usage: RoleUsage,
}

/// Cleanup mode decided for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    /// Every role is unused; the whole stack is deleted.
    AllUnused,
    /// Only some roles are unused; they are removed through a change set.
    Mixed,
}

impl PlanMode {
    /// Wire representation of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllUnused => "all-unused",
            Self::Mixed => "mixed",
        }
    }

    /// Parses the wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all-unused" => Some(Self::AllUnused),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`Plan`].
///
/// States advance along
/// `planned → quarantined → changeset-prepared → executed → {completed, deleted}`.
/// Re-running a phase is safe: each phase's selection predicate picks up
/// exactly the plans its previous run left behind. The one revisit is
/// quarantine, which also reselects `changeset-prepared` plans so an
/// interrupted prepare can be redone from a known-denied baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanState {
    /// Plan derived from upstream classification.
    Planned,
    /// Every unused role is backed up and denied.
    Quarantined,
    /// The delete-or-changeset decision is staged.
    ChangesetPrepared,
    /// The stack operation reached a terminal status.
    Executed,
    /// Terminal: change set applied.
    Completed,
    /// Terminal: stack deleted.
    Deleted,
}

impl PlanState {
    /// Every lifecycle state, in order.
    pub const ALL: [Self; 6] = [
        Self::Planned,
        Self::Quarantined,
        Self::ChangesetPrepared,
        Self::Executed,
        Self::Completed,
        Self::Deleted,
    ];

    /// Wire representation of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Quarantined => "quarantined",
            Self::ChangesetPrepared => "changeset-prepared",
            Self::Executed => "executed",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }

    /// Parses the wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planned" => Some(Self::Planned),
            "quarantined" => Some(Self::Quarantined),
            "changeset-prepared" => Some(Self::ChangesetPrepared),
            "executed" => Some(Self::Executed),
            "completed" => Some(Self::Completed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Position in the lifecycle, for monotonicity checks.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Planned => 0,
            Self::Quarantined => 1,
            Self::ChangesetPrepared => 2,
            Self::Executed => 3,
            Self::Completed | Self::Deleted => 4,
        }
    }

    /// Whether the state ends the lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Deleted)
    }
}

impl std::fmt::Display for PlanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of the cleanup decision and progress for one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The stack this plan covers.
    pub key: StackKey,
    /// Cleanup mode.
    pub mode: PlanMode,
    /// Roles classified unused at planning time.
    pub unused_roles: Vec<String>,
    /// Roles classified used at planning time.
    pub used_roles: Vec<String>,
    /// Whether the whole stack is deleted instead of updated.
    pub delete_stack: bool,
    /// Name of the staged change set, or [`CHANGE_SET_NONE`] when
    /// `delete_stack` is set.
    pub change_set_name: String,
    /// Lifecycle state.
    pub state: PlanState,
    /// Last state-transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Creates a freshly planned record.
    ///
    /// `delete_stack` is pre-set for `all-unused` stacks; the change-set
    /// name starts at the sentinel in either mode.
    #[must_use]
    pub fn new(
        key: StackKey,
        mode: PlanMode,
        unused_roles: Vec<String>,
        used_roles: Vec<String>,
    ) -> Self {
        Self {
            key,
            mode,
            unused_roles,
            used_roles,
            delete_stack: mode == PlanMode::AllUnused,
            change_set_name: CHANGE_SET_NONE.to_string(),
            state: PlanState::Planned,
            updated_at: Utc::now(),
        }
    }
}

/// The staged outcome of plan refinement: what the executor must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// Delete the whole stack.
    DeleteStack,
    /// Execute the named change set.
    ChangeSet(String),
}

impl ExecutionTarget {
    /// The change-set name this target stores on the plan.
    #[must_use]
    pub fn change_set_name(&self) -> &str {
        match self {
            Self::DeleteStack => CHANGE_SET_NONE,
            Self::ChangeSet(name) => name,
        }
    }

    /// Whether the target is a whole-stack deletion.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteStack)
    }
}

/// Lifecycle state of a quarantined role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarantineState {
    /// Trust policy replaced with deny-all; backup stored.
    Quarantined,
}

impl QuarantineState {
    /// Wire representation of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quarantined => "quarantined",
        }
    }
}

/// Per-role quarantine record.
///
/// Written only after the backup object exists and the deny policy is
/// applied; the backup reference therefore always points at a retrievable
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleQuarantineRecord {
    /// Role name.
    pub role: String,
    /// Quarantine lifecycle state.
    pub state: QuarantineState,
    /// Location of the compressed trust-policy backup
    /// (`s3://bucket/key`).
    pub backup_location: String,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleQuarantineRecord {
    /// Creates a quarantined-role record pointing at a stored backup.
    #[must_use]
    pub fn quarantined(role: impl Into<String>, backup_location: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            state: QuarantineState::Quarantined,
            backup_location: backup_location.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Stack operation the executor performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionAction {
    /// The stack was deleted.
    DeleteStack,
    /// A change set was executed.
    ExecuteChangeset,
}

impl ExecutionAction {
    /// Wire representation of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeleteStack => "delete-stack",
            Self::ExecuteChangeset => "execute-changeset",
        }
    }

    /// Parses the wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delete-stack" => Some(Self::DeleteStack),
            "execute-changeset" => Some(Self::ExecuteChangeset),
            _ => None,
        }
    }

    /// Final plan state this action maps to.
    #[must_use]
    pub const fn final_state(self) -> PlanState {
        match self {
            Self::DeleteStack => PlanState::Deleted,
            Self::ExecuteChangeset => PlanState::Completed,
        }
    }
}

impl std::fmt::Display for ExecutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a stack operation that reached a terminal status.
///
/// At most one exists per stack; a retried execution overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// What the executor did.
    pub action: ExecutionAction,
    /// Terminal stack status string, as reported by the cloud.
    pub status: String,
    /// When the terminal status was observed.
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Creates an execution record for a freshly observed terminal status.
    #[must_use]
    pub fn new(action: ExecutionAction, status: impl Into<String>) -> Self {
        Self {
            action,
            status: status.into(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_round_trip() {
        let key = StackKey::new("111111111111", "svc-a");
        assert_eq!(key.partition_key(), "111111111111#svc-a");

        let parsed = StackKey::from_partition_key("111111111111#svc-a")
            .expect("key should parse");
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_partition_key_keeps_stack_hashes() {
        // Stack names may themselves contain '#'; only the first separator
        // belongs to the key.
        let parsed = StackKey::from_partition_key("222#svc#extra")
            .expect("key should parse");
        assert_eq!(parsed.account, "222");
        assert_eq!(parsed.stack, "svc#extra");
    }

    #[test]
    fn test_partition_key_rejects_missing_separator() {
        assert!(StackKey::from_partition_key("no-separator").is_err());
    }

    #[test]
    fn test_inventory_partition_key_scope() {
        let key = StackKey::new("111111111111", "svc-a");
        assert_eq!(key.inventory_partition_key(), "111111111111#global#svc-a");
    }

    #[test]
    fn test_new_plan_all_unused_presets_delete() {
        let plan = Plan::new(
            StackKey::new("111111111111", "svc-a"),
            PlanMode::AllUnused,
            vec!["r1".into(), "r2".into()],
            vec![],
        );

        assert!(plan.delete_stack);
        assert_eq!(plan.change_set_name, CHANGE_SET_NONE);
        assert_eq!(plan.state, PlanState::Planned);
    }

    #[test]
    fn test_new_plan_mixed_does_not_delete() {
        let plan = Plan::new(
            StackKey::new("111111111111", "svc-b"),
            PlanMode::Mixed,
            vec!["r3".into()],
            vec!["r4".into()],
        );

        assert!(!plan.delete_stack);
        assert_eq!(plan.change_set_name, CHANGE_SET_NONE);
    }

    #[test]
    fn test_plan_state_ranks_are_monotone() {
        let sequence = [
            PlanState::Planned,
            PlanState::Quarantined,
            PlanState::ChangesetPrepared,
            PlanState::Executed,
            PlanState::Completed,
        ];
        for pair in sequence.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert_eq!(PlanState::Completed.rank(), PlanState::Deleted.rank());
    }

    #[test]
    fn test_plan_state_wire_round_trip() {
        for state in [
            PlanState::Planned,
            PlanState::Quarantined,
            PlanState::ChangesetPrepared,
            PlanState::Executed,
            PlanState::Completed,
            PlanState::Deleted,
        ] {
            assert_eq!(PlanState::parse(state.as_str()), Some(state));
        }
        assert!(PlanState::parse("unknown").is_none());
    }

    #[test]
    fn test_execution_action_final_state() {
        assert_eq!(
            ExecutionAction::DeleteStack.final_state(),
            PlanState::Deleted
        );
        assert_eq!(
            ExecutionAction::ExecuteChangeset.final_state(),
            PlanState::Completed
        );
    }

    #[test]
    fn test_execution_target_sentinel() {
        assert_eq!(ExecutionTarget::DeleteStack.change_set_name(), CHANGE_SET_NONE);
        assert!(ExecutionTarget::DeleteStack.is_delete());

        let target = ExecutionTarget::ChangeSet("remove-unused-20240101000000".into());
        assert_eq!(target.change_set_name(), "remove-unused-20240101000000");
        assert!(!target.is_delete());
    }
}
