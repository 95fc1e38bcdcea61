//! Execution context shared by every query.

use procure_core::{Config, Result};
use procure_pipeline::shaper::shape_rows;
use procure_pipeline::{Aggregate, AggregateOptions, Cursor, Pipeline};
use serde::de::DeserializeOwned;

/// Engine and configuration a query runs against.
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub engine: &'a dyn Aggregate,
    pub config: &'a Config,
}

impl<'a> QueryContext<'a> {
    pub fn new(engine: &'a dyn Aggregate, config: &'a Config) -> Self {
        Self { engine, config }
    }

    /// Run a pipeline against the contracts collection.
    pub fn contracts(&self, pipeline: &Pipeline, options: AggregateOptions) -> Result<Cursor> {
        self.engine
            .aggregate(&self.config.collections.contracts, pipeline, options)
    }

    /// Run a pipeline and deserialize every output document.
    pub fn rows<T: DeserializeOwned>(&self, pipeline: &Pipeline) -> Result<Vec<T>> {
        shape_rows(self.contracts(pipeline, AggregateOptions::default())?)
    }

    /// Like [`rows`](Self::rows), with large intermediate results allowed.
    pub fn rows_on_disk<T: DeserializeOwned>(&self, pipeline: &Pipeline) -> Result<Vec<T>> {
        shape_rows(self.contracts(pipeline, AggregateOptions::allow_disk_use())?)
    }
}
