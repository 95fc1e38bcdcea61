//! Query catalog: dispatch by identifier.
//!
//! Identifiers are the names the dashboard uses. Entries are kept in the
//! order the dashboard lists them.

use crate::context::QueryContext;
use crate::summary::{box_summary, BoxSummary, Dimension};
use crate::{business, country, cpv};
use procure_core::{Config, Error, EuFunds, QueryParams, Result, Value};
use procure_pipeline::Aggregate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::info;

/// Every query the catalog can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryId {
    CpvExample,
    CpvBox,
    CpvTreemap,
    CpvBarTop,
    CpvBarBottom,
    CpvBarEuFunded,
    CpvBarNotEuFunded,
    CpvMap,
    CpvHistogram,
    CpvBarDifference,
    CountryBox,
    CountryTreemap,
    CountryBarTop,
    CountryBarBottom,
    CountryMap,
    BusinessBox,
    BusinessBarTop,
    BusinessBarBottom,
    BusinessTreemap,
    BusinessMap,
    BusinessConnection,
}

impl QueryId {
    pub const ALL: [QueryId; 21] = [
        QueryId::CpvExample,
        QueryId::CpvBox,
        QueryId::CpvTreemap,
        QueryId::CpvBarTop,
        QueryId::CpvBarBottom,
        QueryId::CpvBarEuFunded,
        QueryId::CpvBarNotEuFunded,
        QueryId::CpvMap,
        QueryId::CpvHistogram,
        QueryId::CpvBarDifference,
        QueryId::CountryBox,
        QueryId::CountryTreemap,
        QueryId::CountryBarTop,
        QueryId::CountryBarBottom,
        QueryId::CountryMap,
        QueryId::BusinessBox,
        QueryId::BusinessBarTop,
        QueryId::BusinessBarBottom,
        QueryId::BusinessTreemap,
        QueryId::BusinessMap,
        QueryId::BusinessConnection,
    ];

    /// Dashboard identifier.
    pub fn name(self) -> &'static str {
        match self {
            QueryId::CpvExample => "ex0_cpv_example",
            QueryId::CpvBox => "ex1_cpv_box",
            QueryId::CpvTreemap => "ex2_cpv_treemap",
            QueryId::CpvBarTop => "ex3_cpv_bar_1",
            QueryId::CpvBarBottom => "ex4_cpv_bar_2",
            QueryId::CpvBarEuFunded => "ex5_cpv_bar_3",
            QueryId::CpvBarNotEuFunded => "ex6_cpv_bar_4",
            QueryId::CpvMap => "ex7_cpv_map",
            QueryId::CpvHistogram => "ex8_cpv_hist",
            QueryId::CpvBarDifference => "ex9_cpv_bar_diff",
            QueryId::CountryBox => "ex10_country_box",
            QueryId::CountryTreemap => "ex11_country_treemap",
            QueryId::CountryBarTop => "ex12_country_bar_1",
            QueryId::CountryBarBottom => "ex13_country_bar_2",
            QueryId::CountryMap => "ex14_country_map",
            QueryId::BusinessBox => "ex15_business_box",
            QueryId::BusinessBarTop => "ex16_business_bar_1",
            QueryId::BusinessBarBottom => "ex17_business_bar_2",
            QueryId::BusinessTreemap => "ex18_business_treemap",
            QueryId::BusinessMap => "ex19_business_map",
            QueryId::BusinessConnection => "ex20_business_connection",
        }
    }

    /// Dimension of the five-number summaries.
    pub fn box_dimension(self) -> Option<Dimension> {
        match self {
            QueryId::CpvBox => Some(Dimension::Cpv),
            QueryId::CountryBox => Some(Dimension::Country),
            QueryId::BusinessBox => Some(Dimension::Business),
            _ => None,
        }
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        QueryId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| Error::query_not_found(s))
    }
}

/// Result of a dispatched query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Shaped documents of a list-returning query.
    Rows(Vec<Value>),
    /// Five-number summary of a box query.
    Summary(BoxSummary),
}

impl QueryOutput {
    pub fn rows(&self) -> Option<&[Value]> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Summary(_) => None,
        }
    }

    pub fn summary(&self) -> Option<&BoxSummary> {
        match self {
            QueryOutput::Summary(summary) => Some(summary),
            QueryOutput::Rows(_) => None,
        }
    }
}

fn to_rows<T: Serialize>(rows: Vec<T>) -> Result<QueryOutput> {
    let values = rows
        .into_iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(QueryOutput::Rows(values))
}

/// The query registry.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    config: Config,
}

impl Catalog {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identifiers in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> {
        QueryId::ALL.into_iter().map(QueryId::name)
    }

    /// Parameters the dashboard passes when the caller gives none.
    pub fn default_params(&self, id: QueryId) -> QueryParams {
        let params = self.config.default_params();
        match id {
            QueryId::CpvHistogram => {
                params.with_cpv_division(self.config.defaults.cpv_division.clone())
            }
            _ => params,
        }
    }

    /// Run a query by dashboard identifier.
    pub fn run(&self, engine: &dyn Aggregate, name: &str, params: &QueryParams) -> Result<QueryOutput> {
        let id: QueryId = name.parse()?;
        self.run_id(engine, id, params)
    }

    /// Run a query.
    pub fn run_id(&self, engine: &dyn Aggregate, id: QueryId, params: &QueryParams) -> Result<QueryOutput> {
        let ctx = QueryContext::new(engine, &self.config);
        let start = Instant::now();

        let output = match id {
            QueryId::CpvBox => QueryOutput::Summary(box_summary(&ctx, Dimension::Cpv, params)?),
            QueryId::CountryBox => QueryOutput::Summary(box_summary(&ctx, Dimension::Country, params)?),
            QueryId::BusinessBox => QueryOutput::Summary(box_summary(&ctx, Dimension::Business, params)?),
            QueryId::CpvExample => to_rows(cpv::example(&ctx, params)?)?,
            QueryId::CpvTreemap => to_rows(cpv::treemap(&ctx, params)?)?,
            QueryId::CpvBarTop => to_rows(cpv::bar_top(&ctx, params)?)?,
            QueryId::CpvBarBottom => to_rows(cpv::bar_bottom(&ctx, params)?)?,
            QueryId::CpvBarEuFunded => to_rows(cpv::bar_funded(&ctx, params, EuFunds::Yes)?)?,
            QueryId::CpvBarNotEuFunded => to_rows(cpv::bar_funded(&ctx, params, EuFunds::No)?)?,
            QueryId::CpvMap => to_rows(cpv::map(&ctx, params)?)?,
            QueryId::CpvHistogram => to_rows(cpv::histogram(&ctx, params)?)?,
            QueryId::CpvBarDifference => to_rows(cpv::bar_difference(&ctx, params)?)?,
            QueryId::CountryTreemap => to_rows(country::treemap(&ctx, params)?)?,
            QueryId::CountryBarTop => to_rows(country::bar_top(&ctx, params)?)?,
            QueryId::CountryBarBottom => to_rows(country::bar_bottom(&ctx, params)?)?,
            QueryId::CountryMap => to_rows(country::map(&ctx, params)?)?,
            QueryId::BusinessBarTop => to_rows(business::bar_top(&ctx, params)?)?,
            QueryId::BusinessBarBottom => to_rows(business::bar_bottom(&ctx, params)?)?,
            QueryId::BusinessTreemap => to_rows(business::treemap(&ctx, params)?)?,
            QueryId::BusinessMap => to_rows(business::map(&ctx, params)?)?,
            QueryId::BusinessConnection => to_rows(business::connection(&ctx, params)?)?,
        };

        let rows = output.rows().map_or(1, <[Value]>::len);
        info!(query = %id, rows, elapsed_ms = start.elapsed().as_millis() as u64, "query dispatched");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_contract, Fixture};
    use serde_json::json;

    fn make_catalog_fixture() -> Fixture {
        let mut records = vec![
            make_contract(2010, "PT", "10000000", 100.0),
            make_contract(2011, "PT", "20000000", 900.0),
            make_contract(2012, "ES", "45000000", 300.0),
            make_contract(2007, "PT", "45000000", 1e6),
            make_contract(2013, "US", "45000000", 1e6),
        ];
        records[2].eu_funded = Some(EuFunds::No);
        Fixture::new(records)
    }

    #[test]
    fn test_ids_round_trip_in_order() {
        let catalog = Catalog::default();
        let ids: Vec<_> = catalog.ids().collect();
        assert_eq!(ids.len(), 21);
        assert_eq!(ids[0], "ex0_cpv_example");
        assert_eq!(ids[20], "ex20_business_connection");
        for id in QueryId::ALL {
            assert_eq!(id.name().parse::<QueryId>().unwrap(), id);
        }
    }

    #[test]
    fn test_unknown_id_is_query_not_found() {
        let fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        let err = catalog
            .run(&fixture.engine, "ex21_nothing", &fixture.params())
            .unwrap_err();
        assert!(matches!(err, Error::QueryNotFound(ref id) if id == "ex21_nothing"));
    }

    #[test]
    fn test_map_reports_highest_division() {
        let fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        let output = catalog
            .run(&fixture.engine, "ex7_cpv_map", &fixture.params())
            .unwrap();

        let rows = output.rows().unwrap();
        let pt = rows
            .iter()
            .find(|r| r["country"] == json!("Portugal"))
            .unwrap();
        assert_eq!(pt["cpv"], json!("20"));
        assert_eq!(pt["avg"], json!(900.0));
    }

    #[test]
    fn test_rows_stay_in_filter_range() {
        let fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        let output = catalog
            .run(&fixture.engine, "ex11_country_treemap", &fixture.params())
            .unwrap();

        let rows = output.rows().unwrap();
        assert_eq!(rows.len(), 2);
        let total: i64 = rows.iter().map(|r| r["count"].as_i64().unwrap()).sum();
        assert_eq!(total, 3);
        assert!(rows.iter().all(|r| r["country"] != json!("United States")));
    }

    #[test]
    fn test_every_query_runs() {
        let fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        for id in QueryId::ALL {
            let output = catalog
                .run_id(&fixture.engine, id, &catalog.default_params(id))
                .unwrap();
            assert_eq!(output.summary().is_some(), id.box_dimension().is_some(), "{id}");
        }
    }

    #[test]
    fn test_box_output() {
        let fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        let output = catalog
            .run(&fixture.engine, "ex1_cpv_box", &fixture.params())
            .unwrap();
        // Divisions 10, 20, 45 average 100, 900, 300.
        assert_eq!(output.summary().unwrap().avg_value, 433);
    }

    #[test]
    fn test_bulk_insert_is_visible_to_queries() {
        use procure_core::ContractSink;

        let mut fixture = make_catalog_fixture();
        let catalog = Catalog::new(fixture.config.clone());
        let ids = fixture
            .engine
            .source_mut()
            .insert_many(vec![make_contract(2015, "PT", "45000000", 5.0)])
            .unwrap();
        assert_eq!(ids, vec![procure_core::ContractId(6)]);

        let output = catalog
            .run(&fixture.engine, "ex0_cpv_example", &fixture.params())
            .unwrap();
        assert_eq!(output.rows().unwrap(), &[json!({"result": 4})]);
    }
}
