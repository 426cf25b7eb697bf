// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

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
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
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

//! # Linode Provider
//!
//! Declarative resource provider core for Linode compute instances and LKE
//! clusters.
//!
//! ## Overview
//!
//! A host engine owns the desired configuration and the stored state of each
//! resource. This crate answers its callbacks:
//!
//! - Validate and plan a change without touching the API
//! - Create, read, update, delete and import instances and LKE clusters
//! - Read the `linode_instances` and `linode_lke_cluster` data sources
//!
//! ## Architecture
//!
//! Every callback follows the same path:
//!
//! 1. **Schema**: the attribute tree is validated and normalized
//! 2. **Flatten**: the tree is expanded into typed models
//! 3. **Planner**: prior and desired models become an ordered list of steps
//! 4. **Reconciler**: the steps run against the API, waiting on events
//!
//! ## Modules
//!
//! - [`config`]: Provider configuration, credentials and timeouts
//! - [`linode`]: Linode API client, wire types and the event poller
//! - [`schema`]: Attribute schemas of every resource and data source
//! - [`flatten`]: Conversion between attribute trees and API objects
//! - [`filter`]: Data source filters and their API encoding
//! - [`planner`]: Diff computation and update planning
//! - [`reconciler`]: Resource lifecycles against the API
//! - [`provider`]: Host boundary, registry and JSON-lines server
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! label: web-1
//! region: us-east
//! type: g6-standard-1
//! image: linode/debian12
//! root_pass: "correct-Horse-battery-9"
//! private_ip: true
//! tags: [web]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod linode;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod schema;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ProviderConfig, StateHasher, Timeouts};
pub use error::{ProviderError, Result};
pub use linode::LinodeClient;
pub use planner::{DiffEngine, ResourceDiff};
pub use provider::{Diagnostic, Provider, ProviderMeta, serve};
pub use reconciler::{InstanceReconciler, LkeReconciler};
