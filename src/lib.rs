// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::missing_const_for_fn)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::too_many_arguments)]
#![warn(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Catalog Reconcile
//!
//! Declarative, idempotent and ownership-safe reconciliation of a remote
//! schema catalog (collections, indexes, functions and access roles).
//!
//! ## Overview
//!
//! The desired schema lives in a YAML file. Each run:
//!
//! 1. Tags every declared object with an owner marker and retention policy
//! 2. Lists the objects this tool owns in the catalog (paginated)
//! 3. Classifies each declared object as create, update or unchanged
//! 4. Sweeps owned objects that are no longer declared
//! 5. Orders the operations so mutual references resolve, then submits them
//!
//! Objects without the owner marker are never read, changed or deleted.
//!
//! ## Generations
//!
//! - `catalog:` selects the current generation: one atomic transaction,
//!   updates replace declared fields.
//! - `catalog_v1:` selects the legacy generation: fixed sequential steps,
//!   updates merge and removed keys are nulled.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and hashing
//! - [`query`]: Query-language expressions and snippet parsing
//! - [`catalog`]: Remote catalog client and owned-object observer
//! - [`planner`]: Tagging, diffing, sweeping, ordering and execution
//! - [`backend`]: Generation-specific rendering
//! - [`report`]: Run reports and the logger capability
//! - [`reconciler`]: The end-to-end deploy and remove runs
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! catalog:
//!   collections:
//!     users: {}
//!   functions:
//!     login:
//!       body: "email => users.by_email(email).first()"
//!       role: caller
//!   roles:
//!     caller:
//!       privileges:
//!         - resource: login
//!           actions: { call: true }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod query;
pub mod reconciler;
pub mod report;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{HttpCatalogClient, RemoteClient};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{CatalogConfig, ConfigHasher, ConfigParser, ConfigValidator, Generation};
pub use error::{CatalogSyncError, Result};
pub use planner::{DiffEngine, Plan, PlanExecutor, Planner};
pub use reconciler::{DeployOptions, Reconciler};
pub use report::{Logger, Report, TracingLogger};
