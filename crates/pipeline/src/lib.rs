//! Aggregation pipelines for the procurement query system.
//!
//! This crate handles:
//! - Declarative stage descriptions (filter, project, group, join, sort, limit, bucket)
//! - Reusable pipeline fragments (range filter, division derivation, label lookups)
//! - An in-memory engine executing stages with document-database semantics
//! - Shaping raw aggregation output into typed result rows

pub mod stage;
pub mod value;
pub mod bucket;
pub mod engine;
pub mod builder;
pub mod shaper;

pub use stage::{Accumulator, Expr, Pipeline, Predicate, SortOrder, Stage};
pub use engine::{Aggregate, AggregateOptions, Cursor, MemoryEngine};
pub use bucket::BucketLabel;
