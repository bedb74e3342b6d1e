//! ## Usage
//!
//! Plans GraphQL operations against a set of federated data sources. Each data source resolves
//! part of the supergraph schema; the [`Planner`] decides which data source resolves which field
//! and in what order, and produces a [`Plan`]: fetches in execution order, each bound to one
//! data source, with the selection it requests and the fetches it depends on.
//!
//! ```ignore
//! let mut planner = Planner::new(Configuration {
//!     data_sources: vec![
//!         DataSourceConfiguration::new("accounts")
//!             .with_root_node("Query", ["me"])
//!             .with_root_node("User", ["id", "name"])
//!             .with_key("User", "id"),
//!         DataSourceConfiguration::new("reviews")
//!             .with_root_node("User", ["reviews"])
//!             .with_child_node("Review", ["body"])
//!             .with_key("User", "id"),
//!     ],
//!     ..Default::default()
//! })?;
//! let plan = planner.plan(&document, &schema, None, PlanOptions::default())?;
//! ```
//!
//! Executing the plan is up to the caller.

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod data_source;
mod display_helpers;
pub mod error;
pub(crate) mod operation;
pub mod plan;
pub(crate) mod utils;

pub use crate::data_source::DataSourceConfiguration;
pub use crate::error::ErrorKind;
pub use crate::error::PlanningError;
pub use crate::error::Report;
pub use crate::plan::Configuration;
pub use crate::plan::DebugConfiguration;
pub use crate::plan::Plan;
pub use crate::plan::PlanOptions;
pub use crate::plan::Planner;
