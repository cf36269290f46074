//! The cleanup workflow phases.
//!
//! Each phase is an independent, resumable step over durable state:
//! planner, quarantine, refine, execute, finalize. A phase reads the
//! current lifecycle state from the stores, performs its work, and
//! advances plans monotonically. Running a phase twice is safe; a phase
//! interrupted midway picks up where the state says it left off.

mod execute;
mod finalize;
mod planner;
mod quarantine;
mod refine;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::cloud::{CloudClients, SessionBroker};

pub use execute::{ExecutedStack, ExecutionReport, Executor};
pub use finalize::{FinalizeReport, FinalizedStack, Finalizer};
pub use planner::{Planner, PlannerReport, SkipReason, SkippedStack};
pub use quarantine::{FailedStack, Quarantine, QuarantineReport};
pub use refine::{Refine, RefineOutcome, RefineReport, RefinedPlan};

/// The run identifier used when none is supplied.
const DEFAULT_RUN_ID: &str = "manual";

/// Common input for every phase.
#[derive(Debug, Clone)]
pub struct PhaseInput {
    /// Target account IDs.
    pub accounts: Vec<String>,
    /// Optional run identifier, namespacing backup artifacts.
    pub run_id: Option<String>,
}

impl PhaseInput {
    /// Creates an input for the given accounts with no explicit run ID.
    #[must_use]
    pub fn new(accounts: Vec<String>) -> Self {
        Self {
            accounts,
            run_id: None,
        }
    }

    /// The effective run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.run_id.as_deref().unwrap_or(DEFAULT_RUN_ID)
    }
}

/// A per-account failure recorded in a phase report.
///
/// Account-level failures are report data, not errors: the phase keeps
/// going with the remaining accounts and the caller decides whether to
/// re-run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccountFailure {
    /// The account that failed.
    pub account: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Per-run cache of account sessions.
///
/// An account whose role assumption fails is remembered so later items
/// for the same account skip without retrying the broker.
struct Sessions<'a> {
    broker: &'a dyn SessionBroker,
    cache: HashMap<String, CloudClients>,
    failed: BTreeMap<String, String>,
}

impl<'a> Sessions<'a> {
    fn new(broker: &'a dyn SessionBroker) -> Self {
        Self {
            broker,
            cache: HashMap::new(),
            failed: BTreeMap::new(),
        }
    }

    async fn get(&mut self, account: &str) -> Option<CloudClients> {
        if self.failed.contains_key(account) {
            return None;
        }
        if let Some(clients) = self.cache.get(account) {
            return Some(clients.clone());
        }
        match self.broker.clients_for(account).await {
            Ok(clients) => {
                self.cache.insert(account.to_string(), clients.clone());
                Some(clients)
            }
            Err(e) => {
                warn!(account, error = %e, "Account session unavailable, skipping");
                self.failed.insert(account.to_string(), e.to_string());
                None
            }
        }
    }

    fn failures(&self) -> Vec<AccountFailure> {
        self.failed
            .iter()
            .map(|(account, reason)| AccountFailure {
                account: account.clone(),
                reason: reason.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::cloud::{CloudClients, IdentityService, SessionBroker, StackService};
    use crate::error::{Result, SessionError};

    /// Broker returning canned clients per account; unknown accounts
    /// fail role assumption.
    #[derive(Default)]
    pub struct FakeBroker {
        clients: HashMap<String, CloudClients>,
    }

    impl FakeBroker {
        pub fn with_account(
            mut self,
            account: &str,
            stacks: Arc<dyn StackService>,
            identity: Arc<dyn IdentityService>,
        ) -> Self {
            self.clients
                .insert(account.to_string(), CloudClients { stacks, identity });
            self
        }
    }

    #[async_trait]
    impl SessionBroker for FakeBroker {
        async fn clients_for(&self, account: &str) -> Result<CloudClients> {
            self.clients.get(account).cloned().ok_or_else(|| {
                SessionError::AssumeRoleFailed {
                    account: account.to_string(),
                    message: "access denied".to_string(),
                }
                .into()
            })
        }
    }
}
