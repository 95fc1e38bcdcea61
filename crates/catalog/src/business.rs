//! Queries grouped by awarding entity.

use crate::context::QueryContext;
use procure_core::{fields, Config, QueryParams, Result};
use procure_pipeline::builder::{argmax_per_group, bottom_n, label_lookup, match_range, top_n};
use procure_pipeline::{Accumulator, Expr, Pipeline, Predicate, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyAverage {
    pub company: Option<String>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyCount {
    pub company: Option<String>,
    pub count: i64,
}

/// Awarding entity with the largest total value in a country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMapRow {
    pub company: Option<String>,
    pub sum: f64,
    /// Country display name.
    pub country: Option<String>,
    /// `"<address> <town>"`.
    pub address: Option<String>,
}

/// Awarding/winning entity pair and how often it occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub companies: Option<String>,
    pub count: i64,
}

fn by_company(params: &QueryParams, name: &str, metric: Accumulator) -> Pipeline {
    Pipeline::new()
        .then(match_range(&params.filter, []))
        .then(Stage::group(Expr::field(fields::AWARDING_ENTITY_NAME), [(name, metric)]))
        .then(Stage::project([
            ("company", Expr::field(fields::ID)),
            (name, Expr::field(name)),
        ]))
}

pub fn average_pipeline(config: &Config, params: &QueryParams, descending: bool) -> Pipeline {
    let n = config.rankings.top_n;
    by_company(params, "avg", Accumulator::Avg(Expr::field(fields::VALUE_EURO)))
        .then_all(if descending { top_n("avg", n) } else { bottom_n("avg", n) })
}

pub fn bar_top(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CompanyAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, true))
}

pub fn bar_bottom(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CompanyAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, false))
}

pub fn treemap_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    by_company(params, "count", Accumulator::count())
        .then_all(top_n("count", config.rankings.treemap_n))
}

/// Companies with the most contracts.
pub fn treemap(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CompanyCount>> {
    ctx.rows(&treemap_pipeline(ctx.config, params))
}

pub fn map_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    let address = Expr::concat(vec![
        Expr::stringify(Expr::field(fields::AWARDING_ENTITY_ADDRESS)),
        Expr::literal(" "),
        Expr::stringify(Expr::field(fields::AWARDING_ENTITY_TOWN)),
    ]);

    Pipeline::new()
        .then(match_range(
            &params.filter,
            [
                Predicate::not_null(fields::AWARDING_ENTITY_ADDRESS),
                Predicate::not_null(fields::AWARDING_ENTITY_TOWN),
            ],
        ))
        .then_all(argmax_per_group(
            ("iso", Expr::field(fields::COUNTRY_CODE)),
            vec![
                ("company", Expr::field(fields::AWARDING_ENTITY_NAME)),
                ("address", address),
            ],
            ("sum", Accumulator::Sum(Expr::field(fields::VALUE_EURO))),
        ))
        .then_all(label_lookup(
            &config.collections.iso_codes,
            fields::ISO_ALPHA2,
            fields::ISO_NAME,
            "country",
            &["sum", "company", "address"],
        ))
}

/// Highest-total company per country. Groups on every
/// (country, company, address) triple, so it runs with large
/// intermediate results allowed.
pub fn map(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CompanyMapRow>> {
    ctx.rows_on_disk(&map_pipeline(ctx.config, params))
}

pub fn connection_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    let pair = Expr::concat(vec![
        Expr::stringify(Expr::field(fields::AWARDING_ENTITY_NAME)),
        Expr::literal(" with "),
        Expr::stringify(Expr::field(fields::WINNING_ENTITY_NAME)),
    ]);

    Pipeline::new()
        .then(match_range(
            &params.filter,
            [
                Predicate::not_null(fields::AWARDING_ENTITY_NAME),
                Predicate::not_null(fields::WINNING_ENTITY_NAME),
            ],
        ))
        .then(Stage::group(pair, [("count", Accumulator::count())]))
        .then(Stage::project([
            ("companies", Expr::field(fields::ID)),
            ("count", Expr::field("count")),
        ]))
        .then_all(top_n("count", config.rankings.top_n))
}

/// Most frequent awarding/winning entity pairs.
pub fn connection(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<Connection>> {
    ctx.rows(&connection_pipeline(ctx.config, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_award, make_contract, Fixture};
    use approx::assert_relative_eq;
    use procure_core::ContractRecord;

    fn located(record: ContractRecord, address: &str, town: &str) -> ContractRecord {
        ContractRecord {
            awarding_entity_address: Some(address.to_string()),
            awarding_entity_town: Some(town.to_string()),
            ..record
        }
    }

    #[test]
    fn test_connection_pairs() {
        let fixture = Fixture::new(vec![
            make_award("PT", "City of Porto", "Acme", 1.0),
            make_award("PT", "City of Porto", "Acme", 1.0),
            make_award("PT", "City of Porto", "Globex", 1.0),
            make_award("ES", "Madrid", "Acme", 1.0),
            make_award("ES", "Madrid", "Acme", 1.0),
            make_award("ES", "Madrid", "Acme", 1.0),
            make_contract(2015, "ES", "45000000", 1.0),
        ]);
        let rows = connection(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].companies.as_deref(), Some("Madrid with Acme"));
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[1].companies.as_deref(), Some("City of Porto with Acme"));
        assert_eq!(rows[2].count, 1);
    }

    #[test]
    fn test_treemap_truncates() {
        let records = (0..20)
            .flat_map(|i| {
                let name = format!("Entity {i:02}");
                (0..=i).map(move |_| make_award("PT", &name, "Acme", 1.0))
            })
            .collect();
        let fixture = Fixture::new(records);
        let rows = treemap(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(rows.len(), 15);
        assert_eq!(rows[0].company.as_deref(), Some("Entity 19"));
        assert_eq!(rows[0].count, 20);
        assert_eq!(rows[14].count, 6);
    }

    #[test]
    fn test_bar_rankings() {
        let fixture = Fixture::new(vec![
            make_award("PT", "A", "W", 10.0),
            make_award("PT", "B", "W", 30.0),
            make_award("PT", "C", "W", 20.0),
        ]);
        let top = bar_top(&fixture.ctx(), &fixture.params()).unwrap();
        let bottom = bar_bottom(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(top[0].company.as_deref(), Some("B"));
        assert_eq!(bottom[0].company.as_deref(), Some("A"));
        assert_relative_eq!(bottom[2].avg.unwrap(), 30.0);
    }

    #[test]
    fn test_map_picks_largest_total() {
        let fixture = Fixture::new(vec![
            located(make_award("PT", "Porto", "W", 100.0), "Rua A", "Porto"),
            located(make_award("PT", "Porto", "W", 100.0), "Rua A", "Porto"),
            located(make_award("PT", "Lisboa", "W", 150.0), "Rua B", "Lisboa"),
            located(make_award("ES", "Madrid", "W", 5.0), "Calle C", "Madrid"),
            // No address, so excluded.
            make_award("ES", "Sevilla", "W", 1_000.0),
        ]);
        let rows = map(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].country.as_deref(), Some("Spain"));
        assert_eq!(rows[0].company.as_deref(), Some("Madrid"));
        assert_eq!(rows[1].country.as_deref(), Some("Portugal"));
        assert_eq!(rows[1].company.as_deref(), Some("Porto"));
        assert_eq!(rows[1].address.as_deref(), Some("Rua A Porto"));
        assert_relative_eq!(rows[1].sum, 200.0);
    }
}
