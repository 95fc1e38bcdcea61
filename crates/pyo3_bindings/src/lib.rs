//! PyO3 bindings for the procurement dashboard.
//!
//! Exposes the query catalog to the Python dashboard:
//! - Dispatch by query identifier with filter overrides
//! - Bulk insert of contract records
//! - Logging setup

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use procure_catalog::{Catalog, QueryId, QueryOutput};
use procure_core::{
    Config as RustConfig, ContractRecord as RustContractRecord, ContractSink, Error as RustError,
    EuFunds, Value,
};
use procure_pipeline::MemoryEngine;
use procure_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// Conversions
// ============================================================================

fn to_py_err(err: RustError) -> PyErr {
    match err {
        RustError::QueryNotFound(id) => PyKeyError::new_err(id),
        RustError::EmptyAggregate(_) | RustError::Config(_) | RustError::Json(_) => {
            PyValueError::new_err(err.to_string())
        }
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Convert a JSON value into plain Python objects.
fn value_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => (*b).into_py(py),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into_py(py),
            None => n.as_f64().unwrap_or(f64::NAN).into_py(py),
        },
        Value::String(s) => s.as_str().into_py(py),
        Value::Array(items) => {
            let list = PyList::empty_bound(py);
            for item in items {
                list.append(value_to_py(py, item)?)?;
            }
            list.into_any().unbind()
        }
        Value::Object(map) => {
            let dict = PyDict::new_bound(py);
            for (key, item) in map {
                dict.set_item(key, value_to_py(py, item)?)?;
            }
            dict.into_any().unbind()
        }
    })
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// A contract award notice to insert.
#[pyclass]
#[derive(Clone, Default)]
pub struct Contract {
    #[pyo3(get, set)]
    pub year: i64,
    #[pyo3(get, set)]
    pub country_code: Option<String>,
    #[pyo3(get, set)]
    pub cpv_code: Option<String>,
    #[pyo3(get, set)]
    pub value_euro: Option<f64>,
    #[pyo3(get, set)]
    pub award_value_euro: Option<f64>,
    #[pyo3(get, set)]
    pub number_offers: Option<i64>,
    /// "Y", "N" or None.
    #[pyo3(get, set)]
    pub eu_funded: Option<String>,
    #[pyo3(get, set)]
    pub dispatch_date: Option<String>,
    #[pyo3(get, set)]
    pub award_date: Option<String>,
    #[pyo3(get, set)]
    pub awarding_entity_name: Option<String>,
    #[pyo3(get, set)]
    pub awarding_entity_address: Option<String>,
    #[pyo3(get, set)]
    pub awarding_entity_town: Option<String>,
    #[pyo3(get, set)]
    pub winning_entity_name: Option<String>,
}

#[pymethods]
impl Contract {
    #[new]
    #[pyo3(signature = (
        year,
        country_code=None,
        cpv_code=None,
        value_euro=None,
        award_value_euro=None,
        number_offers=None,
        eu_funded=None,
        dispatch_date=None,
        award_date=None,
        awarding_entity_name=None,
        awarding_entity_address=None,
        awarding_entity_town=None,
        winning_entity_name=None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        year: i64,
        country_code: Option<String>,
        cpv_code: Option<String>,
        value_euro: Option<f64>,
        award_value_euro: Option<f64>,
        number_offers: Option<i64>,
        eu_funded: Option<String>,
        dispatch_date: Option<String>,
        award_date: Option<String>,
        awarding_entity_name: Option<String>,
        awarding_entity_address: Option<String>,
        awarding_entity_town: Option<String>,
        winning_entity_name: Option<String>,
    ) -> Self {
        Contract {
            year,
            country_code,
            cpv_code,
            value_euro,
            award_value_euro,
            number_offers,
            eu_funded,
            dispatch_date,
            award_date,
            awarding_entity_name,
            awarding_entity_address,
            awarding_entity_town,
            winning_entity_name,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Contract(year={}, country_code={:?}, cpv_code={:?}, value_euro={:?})",
            self.year, self.country_code, self.cpv_code, self.value_euro
        )
    }
}

impl From<Contract> for RustContractRecord {
    fn from(c: Contract) -> Self {
        RustContractRecord {
            year: c.year,
            country_code: c.country_code,
            cpv_code: c.cpv_code,
            value_euro: c.value_euro,
            award_value_euro: c.award_value_euro,
            number_offers: c.number_offers,
            eu_funded: c.eu_funded.as_deref().and_then(EuFunds::from_flag),
            dispatch_date: c.dispatch_date,
            award_date: c.award_date,
            awarding_entity_name: c.awarding_entity_name,
            awarding_entity_address: c.awarding_entity_address,
            awarding_entity_town: c.awarding_entity_town,
            winning_entity_name: c.winning_entity_name,
        }
    }
}

// ============================================================================
// Python-exposed Engine Classes
// ============================================================================

/// Query catalog over a SQLite contract database.
#[pyclass]
pub struct Dashboard {
    engine: MemoryEngine<SqliteStore>,
    catalog: Catalog,
}

#[pymethods]
impl Dashboard {
    /// Open a database file (or a private in-memory one when `path` is None),
    /// seeding the reference tables if they are empty.
    #[new]
    #[pyo3(signature = (path=None, config_path=None))]
    fn new(path: Option<String>, config_path: Option<String>) -> PyResult<Self> {
        let config = match config_path {
            Some(p) => RustConfig::load(p).map_err(to_py_err)?,
            None => RustConfig::default(),
        };

        let names = config.collections.clone();
        let mut store = match path {
            Some(p) => SqliteStore::open(p, names),
            None => SqliteStore::open_in_memory(names),
        }
        .map_err(to_py_err)?;
        store.seed_reference_data().map_err(to_py_err)?;

        Ok(Dashboard {
            engine: MemoryEngine::new(store, &config.engine),
            catalog: Catalog::new(config),
        })
    }

    /// Query identifiers in catalog order.
    fn queries(&self) -> Vec<&'static str> {
        self.catalog.ids().collect()
    }

    /// Run a query. Box queries return a 5-tuple of ints, all others a
    /// list of dicts. Unset filters take the configured defaults.
    #[pyo3(signature = (name, year_from=None, year_to=None, countries=None, cpv=None))]
    fn run(
        &self,
        py: Python<'_>,
        name: &str,
        year_from: Option<i64>,
        year_to: Option<i64>,
        countries: Option<Vec<String>>,
        cpv: Option<String>,
    ) -> PyResult<PyObject> {
        let id: QueryId = name.parse().map_err(to_py_err)?;

        let mut params = self.catalog.default_params(id);
        if let Some(year) = year_from {
            params.filter.year_from = year;
        }
        if let Some(year) = year_to {
            params.filter.year_to = year;
        }
        if let Some(countries) = countries {
            params.filter.countries = countries;
        }
        if let Some(division) = cpv {
            params.cpv_division = Some(division);
        }

        match self.catalog.run_id(&self.engine, id, &params).map_err(to_py_err)? {
            QueryOutput::Summary(summary) => Ok(summary.as_tuple().into_py(py)),
            QueryOutput::Rows(rows) => {
                let list = PyList::empty_bound(py);
                for row in &rows {
                    list.append(value_to_py(py, row)?)?;
                }
                Ok(list.into_any().unbind())
            }
        }
    }

    /// Append contracts, returning their assigned ids.
    fn insert(&mut self, contracts: Vec<Contract>) -> PyResult<Vec<u64>> {
        let records = contracts.into_iter().map(Into::into).collect();
        let ids = self
            .engine
            .source_mut()
            .insert_many(records)
            .map_err(to_py_err)?;
        Ok(ids.into_iter().map(|id| id.0).collect())
    }

    /// Append contracts given as a JSON array of documents.
    fn insert_json(&mut self, documents: &str) -> PyResult<Vec<u64>> {
        let records: Vec<RustContractRecord> = serde_json::from_str(documents)
            .map_err(|e| to_py_err(RustError::from(e)))?;
        let ids = self
            .engine
            .source_mut()
            .insert_many(records)
            .map_err(to_py_err)?;
        Ok(ids.into_iter().map(|id| id.0).collect())
    }

    /// Number of stored contracts.
    fn contract_count(&self) -> PyResult<u64> {
        self.engine.source().contract_count().map_err(to_py_err)
    }
}

/// Install a `tracing` subscriber. `RUST_LOG` overrides `level`.
/// Returns False if a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> bool {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

// ============================================================================
// Module Definition
// ============================================================================

/// Procurement dashboard queries.
#[pymodule]
fn procure_dash(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Contract>()?;
    m.add_class::<Dashboard>()?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
