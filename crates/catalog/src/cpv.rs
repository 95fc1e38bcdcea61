//! Queries grouped by CPV division.

use crate::context::QueryContext;
use procure_core::{fields, Config, EuFunds, QueryParams, Result};
use procure_pipeline::builder::{
    argmax_per_group, bottom_n, division_expr, division_is, eu_funds, label_lookup, match_range,
    top_n, value_histogram,
};
use procure_pipeline::{Accumulator, BucketLabel, Expr, Pipeline, Predicate, Stage};
use serde::{Deserialize, Serialize};

const DIVISION: &str = "division";

/// Row of the capped row-count example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleCount {
    pub result: u64,
}

/// Contract count per division, labelled by description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpvCount {
    pub cpv: Option<String>,
    pub count: i64,
}

/// Average `value_euro` per division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpvAverage {
    pub cpv: Option<String>,
    pub avg: Option<f64>,
}

/// Highest-average division of a country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpvMapRow {
    /// Division code.
    pub cpv: String,
    pub avg: Option<f64>,
    /// Country display name.
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramRow {
    pub bucket: BucketLabel,
    pub count: u64,
}

/// Average dispatch-minus-award time (ms) and award-minus-estimate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpvDifference {
    pub cpv: Option<String>,
    pub time_difference: Option<f64>,
    pub value_difference: Option<f64>,
}

/// Ranking direction for division averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Top,
    Bottom,
}

/// Project the division before grouping on it.
fn with_division<'a>(carry: impl IntoIterator<Item = &'a str>) -> Stage {
    let carried = carry.into_iter().map(|name| (name.to_string(), Expr::field(name)));
    Stage::project(std::iter::once((DIVISION.to_string(), division_expr())).chain(carried))
}

fn describe_division(config: &Config, carry: &[&str]) -> Vec<Stage> {
    label_lookup(
        &config.collections.cpv,
        fields::CPV_DIVISION,
        fields::CPV_DIVISION_DESCRIPTION,
        "cpv",
        carry,
    )
}

/// Contracts in range with `value_euro` below the configured cap.
pub fn example_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    Pipeline::new()
        .then(match_range(
            &params.filter,
            [Predicate::lt(fields::VALUE_EURO, config.example.value_cap)],
        ))
        .then(Stage::Count("result".to_string()))
}

pub fn example(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<ExampleCount>> {
    ctx.rows(&example_pipeline(ctx.config, params))
}

pub fn treemap_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    Pipeline::new()
        .then(match_range(&params.filter, []))
        .then(with_division([]))
        .then(Stage::group(Expr::field(DIVISION), [("count", Accumulator::count())]))
        .then_all(describe_division(config, &["count"]))
}

/// Contract count per division.
pub fn treemap(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CpvCount>> {
    ctx.rows(&treemap_pipeline(ctx.config, params))
}

/// Division averages ranked in `rank` direction, optionally restricted by
/// the EU-funding flag in `params`.
pub fn average_pipeline(config: &Config, params: &QueryParams, rank: Rank) -> Pipeline {
    let n = config.rankings.top_n;
    let ranking = match rank {
        Rank::Top => top_n("avg", n),
        Rank::Bottom => bottom_n("avg", n),
    };

    Pipeline::new()
        .then(match_range(&params.filter, params.eu_funds.map(eu_funds)))
        .then(with_division([fields::VALUE_EURO]))
        .then(Stage::group(
            Expr::field(DIVISION),
            [("avg", Accumulator::Avg(Expr::field(fields::VALUE_EURO)))],
        ))
        .then_all(describe_division(config, &["avg"]))
        .then_all(ranking)
}

/// Five divisions with the highest average value.
pub fn bar_top(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CpvAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, Rank::Top))
}

/// Five divisions with the lowest average value.
pub fn bar_bottom(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CpvAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, Rank::Bottom))
}

/// Top divisions among contracts with the given funding flag.
pub fn bar_funded(
    ctx: &QueryContext<'_>,
    params: &QueryParams,
    flag: EuFunds,
) -> Result<Vec<CpvAverage>> {
    let params = params.clone().with_eu_funds(flag);
    ctx.rows(&average_pipeline(ctx.config, &params, Rank::Top))
}

pub fn map_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    Pipeline::new()
        .then(match_range(
            &params.filter,
            [
                Predicate::not_null(fields::COUNTRY_CODE),
                Predicate::not_null(fields::CPV_CODE),
            ],
        ))
        .then_all(argmax_per_group(
            ("iso", Expr::field(fields::COUNTRY_CODE)),
            vec![("cpv", division_expr())],
            ("avg", Accumulator::Avg(Expr::field(fields::VALUE_EURO))),
        ))
        .then_all(label_lookup(
            &config.collections.iso_codes,
            fields::ISO_ALPHA2,
            fields::ISO_NAME,
            "country",
            &["avg", "cpv"],
        ))
}

/// Highest-average division per country.
pub fn map(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CpvMapRow>> {
    ctx.rows(&map_pipeline(ctx.config, params))
}

/// Value histogram of one division; the division defaults to the
/// configured one when `params` names none.
pub fn histogram_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    let division = params
        .cpv_division
        .as_deref()
        .unwrap_or(&config.defaults.cpv_division);

    Pipeline::new()
        .then(match_range(
            &params.filter,
            [division_is(division), Predicate::not_null(fields::VALUE_EURO)],
        ))
        .then(with_division([fields::VALUE_EURO]))
        .then(value_histogram(fields::VALUE_EURO, &config.histogram))
        .then(Stage::project([
            ("bucket", Expr::field(fields::ID)),
            ("count", Expr::field("count")),
        ]))
}

pub fn histogram(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<HistogramRow>> {
    ctx.rows(&histogram_pipeline(ctx.config, params))
}

pub fn difference_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    let date = |field: &str| Expr::date_from_string(Expr::field(field));
    let averages = ["time_difference", "value_difference"];

    Pipeline::new()
        .then(match_range(
            &params.filter,
            [
                Predicate::not_null(fields::DISPATCH_DATE),
                Predicate::not_null(fields::AWARD_DATE),
                Predicate::not_null(fields::CPV_CODE),
            ],
        ))
        .then(Stage::project([
            (DIVISION, division_expr()),
            (
                "time_difference",
                Expr::subtract(date(fields::DISPATCH_DATE), date(fields::AWARD_DATE)),
            ),
            (
                "value_difference",
                Expr::subtract(
                    Expr::field(fields::AWARD_VALUE_EURO),
                    Expr::field(fields::VALUE_EURO),
                ),
            ),
        ]))
        .then(Stage::group(
            Expr::field(DIVISION),
            averages.map(|name| (name, Accumulator::Avg(Expr::field(name)))),
        ))
        .then_all(describe_division(config, &averages))
        .then_all(top_n("time_difference", config.rankings.top_n))
}

/// Divisions with the longest average dispatch-to-award delay.
pub fn bar_difference(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CpvDifference>> {
    ctx.rows(&difference_pipeline(ctx.config, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_contract, Fixture};
    use approx::assert_relative_eq;
    use procure_core::ContractRecord;

    fn make_dated(cpv: &str, dispatch: &str, award: &str, value: f64, awarded: f64) -> ContractRecord {
        ContractRecord {
            dispatch_date: Some(dispatch.to_string()),
            award_date: Some(award.to_string()),
            award_value_euro: Some(awarded),
            ..make_contract(2015, "PT", cpv, value)
        }
    }

    #[test]
    fn test_example_count_applies_cap_and_range() {
        let fixture = Fixture::new(vec![
            make_contract(2010, "PT", "45000000", 10.0),
            make_contract(2010, "PT", "45000000", 2.0e8),
            make_contract(2001, "PT", "45000000", 10.0),
            make_contract(2010, "US", "45000000", 10.0),
        ]);
        let rows = example(&fixture.ctx(), &fixture.params()).unwrap();
        assert_eq!(rows, vec![ExampleCount { result: 1 }]);
    }

    #[test]
    fn test_treemap_labels_and_counts() {
        let fixture = Fixture::new(vec![
            make_contract(2010, "PT", "45000000", 10.0),
            make_contract(2011, "ES", "45200000", 20.0),
            make_contract(2012, "FR", "50100000", 30.0),
            make_contract(2012, "FR", "", 30.0),
        ]);
        let rows = treemap(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cpv.as_deref(), Some("Construction work"));
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].cpv.as_deref(), Some("Repair and maintenance services"));
        assert_eq!(rows[2], CpvCount { cpv: None, count: 1 });
    }

    #[test]
    fn test_funded_rankings_filter_flag() {
        let mut records = vec![
            make_contract(2010, "PT", "45000000", 100.0),
            make_contract(2010, "PT", "50000000", 900.0),
        ];
        records[1].eu_funded = Some(EuFunds::No);
        let fixture = Fixture::new(records);

        let funded = bar_funded(&fixture.ctx(), &fixture.params(), EuFunds::Yes).unwrap();
        assert_eq!(funded.len(), 1);
        assert_eq!(funded[0].cpv.as_deref(), Some("Construction work"));

        let unfunded = bar_funded(&fixture.ctx(), &fixture.params(), EuFunds::No).unwrap();
        assert_eq!(unfunded.len(), 1);
        assert_relative_eq!(unfunded[0].avg.unwrap(), 900.0);
    }

    #[test]
    fn test_histogram_counts_sum_to_valued_records() {
        let mut records: Vec<ContractRecord> = [0.0, 50_000.0, 100_000.0, 250_000.0, 999_999.0, 1_000_000.0, 5e6]
            .into_iter()
            .map(|v| make_contract(2015, "PT", "50100000", v))
            .collect();
        // Other division, and a record without a value.
        records.push(make_contract(2015, "PT", "45000000", 10.0));
        let mut no_value = make_contract(2015, "PT", "50100000", 0.0);
        no_value.value_euro = None;
        records.push(no_value);

        let fixture = Fixture::new(records);
        let rows = histogram(&fixture.ctx(), &fixture.params()).unwrap();

        let total: u64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, 7);
        assert_eq!(rows[0], HistogramRow { bucket: BucketLabel::Lower(0), count: 2 });
        assert_eq!(rows[1].bucket, BucketLabel::Lower(100_000));
        assert_eq!(rows[2].bucket, BucketLabel::Lower(200_000));
        assert_eq!(rows[3].bucket, BucketLabel::Lower(900_000));
        assert_eq!(rows[4], HistogramRow { bucket: BucketLabel::Other(">1000000".into()), count: 2 });
    }

    #[test]
    fn test_histogram_division_param() {
        let fixture = Fixture::new(vec![make_contract(2015, "PT", "45000000", 10.0)]);
        let params = fixture.params().with_cpv_division("45");
        let rows = histogram(&fixture.ctx(), &params).unwrap();
        assert_eq!(rows, vec![HistogramRow { bucket: BucketLabel::Lower(0), count: 1 }]);

        assert!(histogram(&fixture.ctx(), &fixture.params()).unwrap().is_empty());
    }

    #[test]
    fn test_bar_difference() {
        let fixture = Fixture::new(vec![
            make_dated("45000000", "2015-01-03", "2015-01-01", 100.0, 150.0),
            make_dated("45000000", "2015-01-05", "2015-01-01", 100.0, 50.0),
            make_dated("50000000", "2015-01-02", "2015-01-01", 100.0, 100.0),
        ]);
        let rows = bar_difference(&fixture.ctx(), &fixture.params()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cpv.as_deref(), Some("Construction work"));
        assert_relative_eq!(rows[0].time_difference.unwrap(), 3.0 * 86_400_000.0);
        assert_relative_eq!(rows[0].value_difference.unwrap(), 0.0);
        assert_relative_eq!(rows[1].time_difference.unwrap(), 86_400_000.0);
    }

    #[test]
    fn test_bad_date_is_data_access_error() {
        let fixture = Fixture::new(vec![make_dated("45000000", "yesterday", "2015-01-01", 1.0, 1.0)]);
        let err = bar_difference(&fixture.ctx(), &fixture.params()).unwrap_err();
        assert!(err.is_data_access());
    }
}
