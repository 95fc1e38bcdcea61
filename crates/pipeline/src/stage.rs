//! Declarative stage descriptions.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Nothing here executes;
//! the description serializes to JSON so it can be logged or handed to any
//! engine that implements the same operators.

use procure_core::Value;
use serde::{Deserialize, Serialize};

/// Computed value over a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Dotted field path, e.g. `_id.iso`.
    Field(String),
    /// Constant value.
    Literal(Value),
    /// Character substring; missing or null input yields `""`.
    Substr { input: Box<Expr>, start: usize, len: usize },
    /// String concatenation; null if any operand is null or missing.
    Concat(Vec<Expr>),
    /// String conversion; null stays null.
    ToString(Box<Expr>),
    /// Numeric (or date) difference `left - right`.
    Subtract(Box<Expr>, Box<Expr>),
    /// Parse a date string into epoch milliseconds.
    DateFromString(Box<Expr>),
    /// Element of an array, missing when out of range.
    ArrayElemAt { array: Box<Expr>, index: usize },
    /// Composite value built from named sub-expressions.
    Object(Vec<(String, Expr)>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn substr(input: Expr, start: usize, len: usize) -> Self {
        Expr::Substr {
            input: Box::new(input),
            start,
            len,
        }
    }

    pub fn concat(parts: Vec<Expr>) -> Self {
        Expr::Concat(parts)
    }

    pub fn stringify(input: Expr) -> Self {
        Expr::ToString(Box::new(input))
    }

    pub fn subtract(left: Expr, right: Expr) -> Self {
        Expr::Subtract(Box::new(left), Box::new(right))
    }

    pub fn date_from_string(input: Expr) -> Self {
        Expr::DateFromString(Box::new(input))
    }

    pub fn first_elem(array: Expr) -> Self {
        Expr::ArrayElemAt {
            array: Box::new(array),
            index: 0,
        }
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Expr::Object(fields.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }
}

/// Document filter.
///
/// Field comparisons never match a missing or null field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    And(Vec<Predicate>),
    Gte(String, Value),
    Lte(String, Value),
    Lt(String, Value),
    Eq(String, Value),
    /// Field is present and not null.
    NotNull(String),
    In(String, Vec<Value>),
    /// Two expressions evaluate to equal values.
    ExprEq(Expr, Expr),
}

impl Predicate {
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gte(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.into(), value.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Predicate::NotNull(field.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field.into(), values.into_iter().map(Into::into).collect())
    }
}

/// Per-group reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulator {
    /// Sum of numeric values; integer when every input is an integer.
    Sum(Expr),
    /// Mean of numeric values, null when there are none.
    Avg(Expr),
    /// Value from the first document of the group, in input order.
    First(Expr),
}

impl Accumulator {
    /// `sum(1)`: number of documents in the group.
    pub fn count() -> Self {
        Accumulator::Sum(Expr::literal(1))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Keep documents satisfying the predicate.
    Filter(Predicate),
    /// Replace each document by the listed computed fields. Fields whose
    /// expression is missing are omitted.
    Project(Vec<(String, Expr)>),
    /// Group by key; output `{_id: key, <name>: <accumulated>...}`.
    Group {
        key: Expr,
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Attach all foreign documents whose `foreign_field` equals `local_field`.
    Join {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Stable multi-key sort.
    Sort(Vec<(String, SortOrder)>),
    Limit(usize),
    /// Count documents into half-open `[lower, upper)` buckets.
    Bucket {
        group_by: Expr,
        boundaries: Vec<Value>,
        default_label: String,
    },
    /// Single document `{<field>: n}`; nothing when `n` is zero.
    Count(String),
}

impl Stage {
    /// Short operator name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Filter(_) => "filter",
            Stage::Project(_) => "project",
            Stage::Group { .. } => "group",
            Stage::Join { .. } => "join",
            Stage::Sort(_) => "sort",
            Stage::Limit(_) => "limit",
            Stage::Bucket { .. } => "bucket",
            Stage::Count(_) => "count",
        }
    }

    pub fn project<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Stage::Project(fields.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }

    pub fn group<K: Into<String>>(
        key: Expr,
        accumulators: impl IntoIterator<Item = (K, Accumulator)>,
    ) -> Self {
        Stage::Group {
            key,
            accumulators: accumulators.into_iter().map(|(k, a)| (k.into(), a)).collect(),
        }
    }

    pub fn join(from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        Stage::Join {
            from: from.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
        }
    }

    pub fn sort<K: Into<String>>(keys: impl IntoIterator<Item = (K, SortOrder)>) -> Self {
        Stage::Sort(keys.into_iter().map(|(k, o)| (k.into(), o)).collect())
    }
}

/// Ordered sequence of stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append several stages.
    pub fn then_all(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Operator names in order, e.g. `filter > group > sort`.
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(Stage::name)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let pipeline = Pipeline::new()
            .then(Stage::Filter(Predicate::gte("year", 2010)))
            .then(Stage::group(Expr::field("country_code"), [("count", Accumulator::count())]))
            .then(Stage::Limit(5));

        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.describe(), "filter > group > limit");
    }

    #[test]
    fn test_serializes_as_stage_list() {
        let pipeline: Pipeline = vec![Stage::Limit(3), Stage::Count("n".into())]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(json, serde_json::json!([{"limit": 3}, {"count": "n"}]));
    }
}
