//! In-memory document collections.

use crate::reference;
use procure_core::config::CollectionsConfig;
use procure_core::{
    fields, ContractId, ContractRecord, ContractSink, Document, DocumentSource, Result, Value,
};
use std::collections::HashMap;
use tracing::debug;

/// Named collections held in memory.
///
/// Reading an unknown collection yields no documents.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Document>>,
    names: CollectionsConfig,
    next_id: u64,
}

impl MemoryStore {
    /// Create an empty store using the given collection names.
    pub fn new(names: CollectionsConfig) -> Self {
        Self {
            collections: HashMap::new(),
            names,
            next_id: 1,
        }
    }

    /// Create a store seeded with the static reference tables.
    pub fn with_reference_data(names: CollectionsConfig) -> Self {
        let cpv = reference::cpv_divisions().iter().map(|d| d.to_document()).collect();
        let iso = reference::iso_countries().iter().map(|c| c.to_document()).collect();

        let mut store = Self::new(names.clone());
        store.replace_collection(&names.cpv, cpv);
        store.replace_collection(&names.iso_codes, iso);
        store
    }

    /// Replace the contents of a collection.
    pub fn replace_collection(&mut self, name: &str, documents: Vec<Document>) {
        self.collections.insert(name.to_string(), documents);
    }

    /// Append raw documents to a collection.
    pub fn extend_collection(&mut self, name: &str, documents: impl IntoIterator<Item = Document>) {
        self.collections
            .entry(name.to_string())
            .or_default()
            .extend(documents);
    }

    /// Number of documents in a collection.
    pub fn len(&self, name: &str) -> usize {
        self.collections.get(name).map_or(0, Vec::len)
    }

    /// Whether a collection is empty or unknown.
    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }

    /// Collection names in use.
    pub fn names(&self) -> &CollectionsConfig {
        &self.names
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(CollectionsConfig::default())
    }
}

impl DocumentSource for MemoryStore {
    fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }
}

impl ContractSink for MemoryStore {
    fn insert_many(&mut self, records: Vec<ContractRecord>) -> Result<Vec<ContractId>> {
        let mut ids = Vec::with_capacity(records.len());
        let mut docs = Vec::with_capacity(records.len());

        for record in &records {
            let id = ContractId(self.next_id);
            self.next_id += 1;

            let mut doc = record.to_document();
            doc.insert(fields::ID.to_string(), Value::from(id.0));
            docs.push(doc);
            ids.push(id);
        }

        let contracts = self.names.contracts.clone();
        self.extend_collection(&contracts, docs);
        debug!(count = ids.len(), collection = %contracts, "appended contracts");

        Ok(ids)
    }
}
