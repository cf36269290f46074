//! Persistent state for the cleanup workflow.
//!
//! Two tables drive the pipeline: a read-only inventory table produced
//! upstream (stack summaries and per-role usage classifications) and the
//! cleanup table this crate owns (plans, quarantine records, execution
//! records). The [`InventoryStore`] and [`CleanupStore`] traits abstract
//! over the backend so phases can run against DynamoDB in production and
//! [`MemoryStore`] in tests.

mod dynamo;
mod memory;
#[allow(clippy::module_inception)]
mod store;
pub mod types;

pub use dynamo::{DynamoCleanupStore, DynamoInventoryStore};
pub use memory::MemoryStore;
pub use store::{CleanupStore, InventoryStore};
