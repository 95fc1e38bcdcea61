//! Queries grouped by country.

use crate::context::QueryContext;
use procure_core::{fields, Config, EuFunds, QueryParams, Result};
use procure_pipeline::builder::{bottom_n, eu_funds, label_lookup, match_range, top_n};
use procure_pipeline::{Accumulator, Expr, Pipeline, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryAverage {
    pub country: Option<String>,
    pub avg: Option<f64>,
}

/// Total EU-funded `value_euro` of a country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySum {
    pub country: Option<String>,
    pub sum: f64,
}

fn by_country(params: &QueryParams, name: &str, metric: Accumulator) -> Pipeline {
    Pipeline::new()
        .then(match_range(&params.filter, params.eu_funds.map(eu_funds)))
        .then(Stage::group(Expr::field(fields::COUNTRY_CODE), [(name, metric)]))
}

fn name_country(config: &Config, carry: &str) -> Vec<Stage> {
    label_lookup(
        &config.collections.iso_codes,
        fields::ISO_ALPHA2,
        fields::ISO_NAME,
        "country",
        &[carry],
    )
}

pub fn treemap_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    by_country(params, "count", Accumulator::count()).then_all(name_country(config, "count"))
}

/// Contract count per country.
pub fn treemap(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CountryCount>> {
    ctx.rows(&treemap_pipeline(ctx.config, params))
}

pub fn average_pipeline(config: &Config, params: &QueryParams, descending: bool) -> Pipeline {
    let n = config.rankings.top_n;
    by_country(params, "avg", Accumulator::Avg(Expr::field(fields::VALUE_EURO)))
        .then_all(name_country(config, "avg"))
        .then_all(if descending { top_n("avg", n) } else { bottom_n("avg", n) })
}

pub fn bar_top(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CountryAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, true))
}

pub fn bar_bottom(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CountryAverage>> {
    ctx.rows(&average_pipeline(ctx.config, params, false))
}

pub fn map_pipeline(config: &Config, params: &QueryParams) -> Pipeline {
    let params = params.clone().with_eu_funds(EuFunds::Yes);
    by_country(&params, "sum", Accumulator::Sum(Expr::field(fields::VALUE_EURO)))
        .then_all(name_country(config, "sum"))
}

/// EU-funded contract value per country.
pub fn map(ctx: &QueryContext<'_>, params: &QueryParams) -> Result<Vec<CountrySum>> {
    ctx.rows(&map_pipeline(ctx.config, params))
}
