//! Five-number box summaries.
//!
//! Every metric is an average of per-group values (average-of-averages),
//! never a flat average over contracts. With unequal group sizes the two
//! differ.

use crate::context::QueryContext;
use procure_core::{fields, EuFunds, QueryParams, Result};
use procure_pipeline::builder::{division_expr, eu_funds, match_range, two_level_average};
use procure_pipeline::shaper::scalar_average;
use procure_pipeline::{Accumulator, AggregateOptions, Expr, Pipeline};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Grouping dimension of a box summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// CPV division (first two characters of the code).
    Cpv,
    /// ISO country code.
    Country,
    /// Awarding entity name.
    Business,
}

impl Dimension {
    /// Group key expression.
    pub fn key(self) -> Expr {
        match self {
            Dimension::Cpv => division_expr(),
            Dimension::Country => Expr::field(fields::COUNTRY_CODE),
            Dimension::Business => Expr::field(fields::AWARDING_ENTITY_NAME),
        }
    }
}

/// Box-plot summary, each metric truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSummary {
    /// Average of per-group average `value_euro`.
    pub avg_value: i64,
    /// Average of per-group contract counts.
    pub avg_count: i64,
    /// Average of per-group average `number_offers`.
    pub avg_offers: i64,
    /// Same as `avg_value`, EU-funded contracts only.
    pub avg_value_eu_funded: i64,
    /// Same as `avg_value`, non-EU-funded contracts only.
    pub avg_value_not_eu_funded: i64,
}

impl BoxSummary {
    pub fn as_tuple(&self) -> (i64, i64, i64, i64, i64) {
        (
            self.avg_value,
            self.avg_count,
            self.avg_offers,
            self.avg_value_eu_funded,
            self.avg_value_not_eu_funded,
        )
    }
}

/// The five pipelines of a box summary, in output order.
pub fn box_pipelines(dimension: Dimension, params: &QueryParams) -> [Pipeline; 5] {
    let avg_value = || Accumulator::Avg(Expr::field(fields::VALUE_EURO));
    let level = |flag: Option<EuFunds>, metric: Accumulator| {
        two_level_average(
            [match_range(&params.filter, flag.map(eu_funds))],
            dimension.key(),
            metric,
        )
    };

    [
        level(None, avg_value()),
        level(None, Accumulator::count()),
        level(None, Accumulator::Avg(Expr::field(fields::NUMBER_OFFERS))),
        level(Some(EuFunds::Yes), avg_value()),
        level(Some(EuFunds::No), avg_value()),
    ]
}

/// Compute a box summary. Any empty metric fails with `EmptyAggregate`.
pub fn box_summary(
    ctx: &QueryContext<'_>,
    dimension: Dimension,
    params: &QueryParams,
) -> Result<BoxSummary> {
    let mut metrics = [0i64; 5];
    for (slot, pipeline) in metrics.iter_mut().zip(box_pipelines(dimension, params)) {
        *slot = scalar_average(ctx.contracts(&pipeline, AggregateOptions::default())?, "average")?;
    }
    debug!(?dimension, ?metrics, "box summary");

    let [avg_value, avg_count, avg_offers, avg_value_eu_funded, avg_value_not_eu_funded] = metrics;
    Ok(BoxSummary {
        avg_value,
        avg_count,
        avg_offers,
        avg_value_eu_funded,
        avg_value_not_eu_funded,
    })
}
