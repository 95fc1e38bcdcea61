//! Data-access collaborators for the procurement query system.
//!
//! This crate handles:
//! - In-memory document collections
//! - SQLite-backed contract and reference storage
//! - Static reference tables (CPV divisions, ISO countries)
//! - Append-only bulk insert of contracts

pub mod memory;
pub mod reference;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
