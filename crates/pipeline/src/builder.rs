//! Reusable pipeline fragments.
//!
//! Every query in the catalog is assembled from these pieces: the shared
//! range filter, CPV division derivation, reference-label lookups,
//! two-level averages, rankings, argmax-per-group and the value histogram.

use crate::stage::{Accumulator, Expr, Pipeline, Predicate, SortOrder, Stage};
use procure_core::config::HistogramConfig;
use procure_core::{fields, EuFunds, FilterParams, Value};

/// Name of the temporary array a label lookup joins into.
const LOOKUP_ARRAY: &str = "lookup";
/// Name of the first lookup match after unwrapping the array.
const LOOKUP_MATCH: &str = "matched";

/// `year_from <= year <= year_to` and `country_code` in the allow-list.
pub fn range_filter(filter: &FilterParams) -> Predicate {
    Predicate::And(vec![
        Predicate::gte(fields::YEAR, filter.year_from),
        Predicate::lte(fields::YEAR, filter.year_to),
        Predicate::is_in(fields::COUNTRY_CODE, filter.countries.iter().cloned()),
    ])
}

/// Filter stage combining the range filter with query-specific predicates.
pub fn match_range(filter: &FilterParams, extra: impl IntoIterator<Item = Predicate>) -> Stage {
    let mut parts = match range_filter(filter) {
        Predicate::And(parts) => parts,
        other => vec![other],
    };
    parts.extend(extra);
    Stage::Filter(Predicate::And(parts))
}

/// Restrict to contracts with the given EU-funding flag.
pub fn eu_funds(flag: EuFunds) -> Predicate {
    Predicate::eq(fields::EU_FUNDED, flag.as_str())
}

/// CPV division: first two characters of `cpv_code`.
pub fn division_expr() -> Expr {
    Expr::substr(Expr::field(fields::CPV_CODE), 0, 2)
}

/// Keep only documents whose derived division equals `division`.
pub fn division_is(division: &str) -> Predicate {
    Predicate::ExprEq(division_expr(), Expr::literal(division))
}

/// Replace a coded `_id` by a display label from a reference collection.
///
/// The first matching reference row wins; unmatched keys leave `label`
/// missing. `carry` lists fields passed through unchanged.
pub fn label_lookup(
    from: &str,
    foreign_field: &str,
    label_field: &str,
    label: &str,
    carry: &[&str],
) -> Vec<Stage> {
    let passthrough = || carry.iter().map(|name| (name.to_string(), Expr::field(*name)));

    let unwrap = std::iter::once((
        LOOKUP_MATCH.to_string(),
        Expr::first_elem(Expr::field(LOOKUP_ARRAY)),
    ))
    .chain(passthrough());

    let relabel = std::iter::once((
        label.to_string(),
        Expr::field(format!("{LOOKUP_MATCH}.{label_field}")),
    ))
    .chain(passthrough());

    vec![
        Stage::join(from, fields::ID, foreign_field, LOOKUP_ARRAY),
        Stage::project(unwrap),
        Stage::project(relabel),
    ]
}

/// Average-of-averages: reduce each group to `metric`, then average the
/// per-group values into a single `{average}` document.
pub fn two_level_average(
    filters: impl IntoIterator<Item = Stage>,
    group_key: Expr,
    metric: Accumulator,
) -> Pipeline {
    Pipeline::new()
        .then_all(filters)
        .then(Stage::group(group_key, [("metric", metric)]))
        .then(Stage::group(
            Expr::Literal(Value::Null),
            [("average", Accumulator::Avg(Expr::field("metric")))],
        ))
}

/// Sort by `field` descending and keep the first `n`.
pub fn top_n(field: &str, n: usize) -> [Stage; 2] {
    [Stage::sort([(field, SortOrder::Descending)]), Stage::Limit(n)]
}

/// Sort by `field` ascending and keep the first `n`.
pub fn bottom_n(field: &str, n: usize) -> [Stage; 2] {
    [Stage::sort([(field, SortOrder::Ascending)]), Stage::Limit(n)]
}

/// Highest `metric` per group.
///
/// Groups by `group` plus every candidate key, sorts by group ascending and
/// metric descending, then keeps the first row of each group. The sort must
/// sit between the two groupings. Output: `{_id: group, <metric>, <candidate>...}`.
pub fn argmax_per_group(
    group: (&str, Expr),
    candidates: Vec<(&str, Expr)>,
    metric: (&str, Accumulator),
) -> Vec<Stage> {
    let (group_name, group_expr) = group;
    let (metric_name, metric_acc) = metric;
    let group_path = format!("{}.{group_name}", fields::ID);

    let mut key = vec![(group_name.to_string(), group_expr)];
    key.extend(candidates.iter().map(|(name, expr)| (name.to_string(), expr.clone())));

    let mut winners = vec![(
        metric_name.to_string(),
        Accumulator::First(Expr::field(metric_name)),
    )];
    winners.extend(candidates.iter().map(|(name, _)| {
        (
            name.to_string(),
            Accumulator::First(Expr::field(format!("{}.{name}", fields::ID))),
        )
    }));

    vec![
        Stage::Group {
            key: Expr::Object(key),
            accumulators: vec![(metric_name.to_string(), metric_acc)],
        },
        Stage::sort([
            (group_path.clone(), SortOrder::Ascending),
            (metric_name.to_string(), SortOrder::Descending),
        ]),
        Stage::Group {
            key: Expr::field(group_path),
            accumulators: winners,
        },
    ]
}

/// Linear histogram over `field`, labelled by lower edge.
pub fn value_histogram(field: &str, config: &HistogramConfig) -> Stage {
    Stage::Bucket {
        group_by: Expr::field(field),
        boundaries: config.boundaries().into_iter().map(Value::from).collect(),
        default_label: config.overflow_label.clone(),
    }
}
