//! Collaborator traits for reading collections and appending contracts.

use crate::error::Result;
use crate::types::{ContractId, ContractRecord, Document};

/// Read access to named document collections.
///
/// Implementations return a snapshot of the collection; queries never write.
pub trait DocumentSource {
    /// All documents of a collection, in storage order.
    fn documents(&self, collection: &str) -> Result<Vec<Document>>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        (**self).documents(collection)
    }
}

/// Append-only bulk insert of contract records.
pub trait ContractSink {
    /// Append records and return their assigned identifiers, in input order.
    fn insert_many(&mut self, records: Vec<ContractRecord>) -> Result<Vec<ContractId>>;
}
