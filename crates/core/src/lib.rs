//! Core types and configuration for the procurement dashboard queries.
//!
//! This crate provides shared types used across all other crates:
//! - Contract records and reference lookups (CPV divisions, ISO countries)
//! - Filter parameters
//! - Configuration structures
//! - Common error types
//! - Collaborator traits for reading and appending documents

pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use source::{ContractSink, DocumentSource};
pub use types::*;
