//! Per-account AWS service clients behind trait seams.
//!
//! Phases never hold SDK clients directly. They ask a [`SessionBroker`]
//! for a [`CloudClients`] bundle scoped to one target account, then talk
//! to the [`StackService`] and [`IdentityService`] traits. The artifact
//! and secret stores run under the tool's own credentials.

mod artifacts;
mod identity;
mod secrets;
mod session;
mod stacks;
mod types;

pub use artifacts::{ArtifactStore, S3ArtifactStore};
pub use identity::{deny_all_trust_policy, IamIdentityService, IdentityService};
pub use secrets::{SecretStore, SsmSecretStore};
pub use session::{SessionBroker, StsSessionBroker};
pub use stacks::{CfnStackService, StackService};
pub use types::{CloudClients, StackResource, StackStatus};

#[cfg(test)]
pub use artifacts::MockArtifactStore;
#[cfg(test)]
pub use identity::MockIdentityService;
#[cfg(test)]
pub use stacks::MockStackService;
