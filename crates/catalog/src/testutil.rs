//! Shared fixtures for catalog tests.

use crate::context::QueryContext;
use procure_core::{Config, ContractRecord, ContractSink, EuFunds, QueryParams};
use procure_pipeline::MemoryEngine;
use procure_store::MemoryStore;

/// Contract with offers set and EU funding flagged "Y".
pub fn make_contract(year: i64, country: &str, cpv: &str, value: f64) -> ContractRecord {
    ContractRecord {
        country_code: Some(country.to_string()),
        cpv_code: Some(cpv.to_string()),
        value_euro: Some(value),
        number_offers: Some(1),
        eu_funded: Some(EuFunds::Yes),
        ..ContractRecord::new(year)
    }
}

/// Awarding/winning entity pair on top of [`make_contract`].
pub fn make_award(country: &str, awarding: &str, winning: &str, value: f64) -> ContractRecord {
    ContractRecord {
        awarding_entity_name: Some(awarding.to_string()),
        winning_entity_name: Some(winning.to_string()),
        ..make_contract(2015, country, "45000000", value)
    }
}

pub struct Fixture {
    pub engine: MemoryEngine<MemoryStore>,
    pub config: Config,
}

impl Fixture {
    pub fn new(records: Vec<ContractRecord>) -> Self {
        let config = Config::default();
        let mut store = MemoryStore::with_reference_data(config.collections.clone());
        store.insert_many(records).unwrap();
        let engine = MemoryEngine::new(store, &config.engine);
        Self { engine, config }
    }

    pub fn ctx(&self) -> QueryContext<'_> {
        QueryContext::new(&self.engine, &self.config)
    }

    pub fn params(&self) -> QueryParams {
        self.config.default_params()
    }
}
