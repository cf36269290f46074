// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![warn(missing_docs)]                // Public items should be documented

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Rolesweep
//!
//! A stateful, resumable cleanup workflow for unused cross-account IAM
//! roles provisioned through CloudFormation stacks.
//!
//! ## Overview
//!
//! Rolesweep consumes an inventory of per-role usage classifications
//! produced upstream and drives each affected stack through a durable
//! lifecycle:
//!
//! 1. **Plan** - derive a cleanup plan per stack (`all-unused` stacks
//!    are deleted whole; `mixed` stacks lose only their unused roles)
//! 2. **Quarantine** - back up each unused role's trust policy to S3,
//!    then replace it with a deny-all document
//! 3. **Refine** - stage the concrete action: stack deletion or an
//!    update change set with the unused role resources removed
//! 4. **Execute** - carry out the action and wait for a terminal stack
//!    status
//! 5. **Finalize** - settle successful executions into their terminal
//!    plan state
//!
//! Every phase is idempotent and resumable: state lives in DynamoDB,
//! advances monotonically, and a re-run picks up exactly the plans the
//! previous run left behind.
//!
//! ## Architecture
//!
//! - [`store`] - DynamoDB-backed plan, quarantine, and execution state
//! - [`cloud`] - per-account AWS clients behind trait seams, brokered
//!   via STS role assumption
//! - [`template`] - JSON template surgery for change-set refinement
//! - [`phases`] - the five workflow phases
//! - [`notify`] - webhook notifications for phase reports
//! - [`config`] - environment-driven settings
//! - [`error`] - the crate-wide error hierarchy

pub mod cloud;
pub mod config;
pub mod error;
pub mod notify;
pub mod phases;
pub mod store;
pub mod template;
