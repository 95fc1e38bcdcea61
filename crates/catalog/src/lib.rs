//! Query catalog for the procurement dashboard.
//!
//! This crate handles:
//! - CPV division queries (box summary, treemap, rankings, map, histogram, time/value difference)
//! - Country queries (box summary, treemap, rankings, EU-funded value map)
//! - Awarding-entity queries (box summary, rankings, treemap, map, co-occurrence)
//! - Dispatch by identifier

pub mod context;
pub mod summary;
pub mod cpv;
pub mod country;
pub mod business;
pub mod registry;

pub use context::QueryContext;
pub use registry::{Catalog, QueryId, QueryOutput};
pub use summary::{BoxSummary, Dimension};

#[cfg(test)]
pub(crate) mod testutil;
