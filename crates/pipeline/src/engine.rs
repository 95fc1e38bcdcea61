//! In-memory aggregation engine.
//!
//! Executes a [`Pipeline`] against collections read from a
//! [`DocumentSource`], one stage at a time, with document-database
//! semantics for missing fields, grouping and ordering.

use crate::bucket::Buckets;
use crate::stage::{Accumulator, Expr, Pipeline, Predicate, SortOrder, Stage};
use crate::value::{canonical_key, compare, get_path, is_nullish, total_cmp, values_equal};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use procure_core::config::EngineConfig;
use procure_core::{fields, Document, DocumentSource, Error, Result, Value};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Allow stages to exceed the in-memory group limit.
    pub allow_disk_use: bool,
}

impl AggregateOptions {
    pub fn allow_disk_use() -> Self {
        Self {
            allow_disk_use: true,
        }
    }
}

/// Sequence of result documents.
#[derive(Debug)]
pub struct Cursor {
    docs: std::vec::IntoIter<Document>,
}

impl Cursor {
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            docs: docs.into_iter(),
        }
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        self.docs.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.docs.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

/// An engine able to run a pipeline against a named collection.
pub trait Aggregate {
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        options: AggregateOptions,
    ) -> Result<Cursor>;
}

/// Executes pipelines in memory over a document source.
pub struct MemoryEngine<S> {
    source: S,
    max_groups: usize,
}

impl<S: DocumentSource> MemoryEngine<S> {
    /// Create an engine reading from `source`.
    pub fn new(source: S, config: &EngineConfig) -> Self {
        Self {
            source,
            max_groups: config.max_groups_in_memory,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access for the append path.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn run_stage(
        &self,
        stage: &Stage,
        docs: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Document>> {
        match stage {
            Stage::Filter(predicate) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(predicate, &doc)? {
                        kept.push(doc);
                    }
                }
                Ok(kept)
            }
            Stage::Project(fields) => docs.iter().map(|doc| project(fields, doc)).collect(),
            Stage::Group { key, accumulators } => {
                self.group(key, accumulators, &docs, options)
            }
            Stage::Join {
                from,
                local_field,
                foreign_field,
                as_field,
            } => self.join(docs, from, local_field, foreign_field, as_field),
            Stage::Sort(keys) => {
                let mut docs = docs;
                docs.sort_by(|a, b| sort_cmp(keys, a, b));
                Ok(docs)
            }
            Stage::Limit(n) => {
                let mut docs = docs;
                docs.truncate(*n);
                Ok(docs)
            }
            Stage::Bucket {
                group_by,
                boundaries,
                default_label,
            } => {
                let buckets = Buckets::new(boundaries)?;
                let values = docs
                    .iter()
                    .map(|doc| eval(group_by, doc))
                    .collect::<Result<Vec<_>>>()?;
                Ok(buckets.count(values.iter().map(Option::as_ref), default_label))
            }
            Stage::Count(field) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut doc = Document::new();
                doc.insert(field.clone(), Value::from(docs.len() as u64));
                Ok(vec![doc])
            }
        }
    }

    fn group(
        &self,
        key: &Expr,
        accumulators: &[(String, Accumulator)],
        docs: &[Document],
        options: AggregateOptions,
    ) -> Result<Vec<Document>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

        for doc in docs {
            let key_value = eval(key, doc)?.unwrap_or(Value::Null);
            let slot = match index.get(&canonical_key(&key_value)) {
                Some(&slot) => slot,
                None => {
                    if groups.len() >= self.max_groups && !options.allow_disk_use {
                        return Err(Error::data_access(format!(
                            "group stage exceeded {} groups in memory; allow disk use to continue",
                            self.max_groups
                        )));
                    }
                    index.insert(canonical_key(&key_value), groups.len());
                    let states = accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect();
                    groups.push((key_value, states));
                    groups.len() - 1
                }
            };

            let states = &mut groups[slot].1;
            for ((_, acc), state) in accumulators.iter().zip(states.iter_mut()) {
                state.add(acc, doc)?;
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key_value, states)| {
                let mut out = Document::new();
                out.insert(fields::ID.to_string(), key_value);
                for ((name, _), state) in accumulators.iter().zip(states) {
                    out.insert(name.clone(), state.finish());
                }
                out
            })
            .collect())
    }

    fn join(
        &self,
        docs: Vec<Document>,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Result<Vec<Document>> {
        let foreign = self.source.documents(from)?;
        let mut ambiguous = 0usize;

        let joined = docs
            .into_iter()
            .map(|mut doc| {
                let local = get_path(&doc, local_field).cloned().unwrap_or(Value::Null);
                let found: Vec<Value> = foreign
                    .iter()
                    .filter(|f| {
                        let value = get_path(f, foreign_field).unwrap_or(&Value::Null);
                        values_equal(value, &local)
                    })
                    .map(|f| Value::Object(f.clone()))
                    .collect();
                if found.len() > 1 {
                    ambiguous += 1;
                }
                doc.insert(as_field.to_string(), Value::Array(found));
                doc
            })
            .collect();

        if ambiguous > 0 {
            warn!(from, ambiguous, "join keys matched more than one reference row");
        }
        Ok(joined)
    }
}

impl<S: DocumentSource> Aggregate for MemoryEngine<S> {
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        options: AggregateOptions,
    ) -> Result<Cursor> {
        let mut docs = self.source.documents(collection)?;
        debug!(collection, stages = %pipeline.describe(), input = docs.len(), "aggregate");

        for stage in pipeline.stages() {
            let before = docs.len();
            docs = self.run_stage(stage, docs, options)?;
            debug!(stage = stage.name(), before, after = docs.len(), "stage done");
        }

        Ok(Cursor::new(docs))
    }
}

/// Running state of one accumulator within one group.
enum AccState {
    Sum { int: i64, float: f64, is_float: bool },
    Avg(Vec<f64>),
    First(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            Accumulator::Avg(_) => AccState::Avg(Vec::new()),
            Accumulator::First(_) => AccState::First(None),
        }
    }

    fn add(&mut self, acc: &Accumulator, doc: &Document) -> Result<()> {
        match (self, acc) {
            (AccState::Sum { int, float, is_float }, Accumulator::Sum(expr)) => {
                if let Some(Value::Number(n)) = eval(expr, doc)? {
                    match n.as_i64() {
                        Some(i) if !*is_float => match int.checked_add(i) {
                            Some(sum) => *int = sum,
                            None => {
                                *is_float = true;
                                *float += *int as f64 + i as f64;
                                *int = 0;
                            }
                        },
                        _ => {
                            *is_float = true;
                            *float += n.as_f64().unwrap_or(0.0);
                        }
                    }
                }
            }
            (AccState::Avg(values), Accumulator::Avg(expr)) => {
                if let Some(Value::Number(n)) = eval(expr, doc)? {
                    if let Some(v) = n.as_f64() {
                        values.push(v);
                    }
                }
            }
            (AccState::First(slot), Accumulator::First(expr)) => {
                if slot.is_none() {
                    *slot = Some(eval(expr, doc)?.unwrap_or(Value::Null));
                }
            }
            _ => unreachable!("accumulator state created from a different accumulator"),
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum { int, float, is_float } => {
                if is_float {
                    Value::from(int as f64 + float)
                } else {
                    Value::from(int)
                }
            }
            AccState::Avg(values) => {
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::from(values.iter().mean())
                }
            }
            AccState::First(value) => value.unwrap_or(Value::Null),
        }
    }
}

fn sort_cmp(keys: &[(String, SortOrder)], a: &Document, b: &Document) -> Ordering {
    for (path, order) in keys {
        let ord = total_cmp(get_path(a, path), get_path(b, path));
        let ord = match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project(fields: &[(String, Expr)], doc: &Document) -> Result<Document> {
    let mut out = Document::new();
    for (name, expr) in fields {
        if let Some(value) = eval(expr, doc)? {
            out.insert(name.clone(), value);
        }
    }
    Ok(out)
}

/// Evaluate a predicate against a document.
pub fn matches(predicate: &Predicate, doc: &Document) -> Result<bool> {
    let ordered = |field: &str, bound: &Value, accept: fn(Ordering) -> bool| {
        get_path(doc, field)
            .and_then(|value| compare(value, bound))
            .is_some_and(accept)
    };

    Ok(match predicate {
        Predicate::And(parts) => {
            for part in parts {
                if !matches(part, doc)? {
                    return Ok(false);
                }
            }
            true
        }
        Predicate::Gte(field, bound) => ordered(field, bound, |o| o != Ordering::Less),
        Predicate::Lte(field, bound) => ordered(field, bound, |o| o != Ordering::Greater),
        Predicate::Lt(field, bound) => ordered(field, bound, |o| o == Ordering::Less),
        Predicate::Eq(field, expected) => {
            get_path(doc, field).is_some_and(|value| values_equal(value, expected))
        }
        Predicate::NotNull(field) => !is_nullish(get_path(doc, field)),
        Predicate::In(field, allowed) => get_path(doc, field)
            .filter(|value| !value.is_null())
            .is_some_and(|value| allowed.iter().any(|a| values_equal(value, a))),
        Predicate::ExprEq(left, right) => {
            let left = eval(left, doc)?.unwrap_or(Value::Null);
            let right = eval(right, doc)?.unwrap_or(Value::Null);
            values_equal(&left, &right)
        }
    })
}

/// Evaluate an expression. `Ok(None)` means the result is missing.
pub fn eval(expr: &Expr, doc: &Document) -> Result<Option<Value>> {
    match expr {
        Expr::Field(path) => Ok(get_path(doc, path).cloned()),
        Expr::Literal(value) => Ok(Some(value.clone())),
        Expr::Substr { input, start, len } => {
            let text = match eval(input, doc)? {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s,
                Some(other) => scalar_to_string(&other)?,
            };
            Ok(Some(Value::from(
                text.chars().skip(*start).take(*len).collect::<String>(),
            )))
        }
        Expr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match eval(part, doc)? {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(other) => {
                        return Err(Error::data_access(format!(
                            "concat only supports strings, got {other}"
                        )))
                    }
                }
            }
            Ok(Some(Value::from(out)))
        }
        Expr::ToString(input) => match eval(input, doc)? {
            None | Some(Value::Null) => Ok(Some(Value::Null)),
            Some(Value::String(s)) => Ok(Some(Value::String(s))),
            Some(other) => Ok(Some(Value::from(scalar_to_string(&other)?))),
        },
        Expr::Subtract(left, right) => {
            let (left, right) = (eval(left, doc)?, eval(right, doc)?);
            match (left, right) {
                (Some(Value::Number(a)), Some(Value::Number(b))) => {
                    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                        if let Some(diff) = a.checked_sub(b) {
                            return Ok(Some(Value::from(diff)));
                        }
                    }
                    let diff = a.as_f64().unwrap_or(0.0) - b.as_f64().unwrap_or(0.0);
                    Ok(Some(Value::from(diff)))
                }
                (l, r) if is_nullish(l.as_ref()) || is_nullish(r.as_ref()) => Ok(Some(Value::Null)),
                (Some(l), Some(r)) => Err(Error::data_access(format!(
                    "cannot subtract {r} from {l}"
                ))),
                _ => Ok(Some(Value::Null)),
            }
        }
        Expr::DateFromString(input) => match eval(input, doc)? {
            None | Some(Value::Null) => Ok(Some(Value::Null)),
            Some(Value::String(s)) => parse_date_millis(&s).map(|ms| Some(Value::from(ms))),
            Some(other) => Err(Error::data_access(format!(
                "date_from_string expects a string, got {other}"
            ))),
        },
        Expr::ArrayElemAt { array, index } => match eval(array, doc)? {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(Value::Null)),
            Some(Value::Array(items)) => Ok(items.into_iter().nth(*index)),
            Some(other) => Err(Error::data_access(format!(
                "array_elem_at expects an array, got {other}"
            ))),
        },
        Expr::Object(fields) => {
            let mut out = Document::new();
            for (name, field_expr) in fields {
                if let Some(value) = eval(field_expr, doc)? {
                    out.insert(name.clone(), value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
    }
}

fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::data_access(format!("cannot convert {other} to string"))),
    }
}

/// Parse an ISO-8601 / RFC 3339 date or date-time (or `dd/mm/yyyy`) into
/// epoch milliseconds, treating naive values as UTC.
pub fn parse_date_millis(text: &str) -> Result<i64> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
    }

    Err(Error::data_access(format!("cannot parse date '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use procure_store::MemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn engine_with(docs: Vec<Value>) -> MemoryEngine<MemoryStore> {
        let mut store = MemoryStore::default();
        store.replace_collection("eu", docs.into_iter().map(doc).collect());
        MemoryEngine::new(store, &EngineConfig::default())
    }

    fn run(engine: &MemoryEngine<MemoryStore>, pipeline: Pipeline) -> Vec<Document> {
        engine
            .aggregate("eu", &pipeline, AggregateOptions::default())
            .unwrap()
            .collect()
    }

    #[test]
    fn test_missing_fields_fail_comparisons() {
        let engine = engine_with(vec![
            json!({"year": 2010, "country_code": "PT"}),
            json!({"country_code": "PT"}),
            json!({"year": null, "country_code": "PT"}),
            json!({"year": "2010", "country_code": "PT"}),
            json!({"year": 2010}),
        ]);
        let pipeline = Pipeline::new().then(Stage::Filter(Predicate::And(vec![
            Predicate::gte("year", 2008),
            Predicate::lte("year", 2020),
            Predicate::is_in("country_code", ["PT", "ES"]),
        ])));

        let out = run(&engine, pipeline);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("year"), Some(&json!(2010)));
    }

    #[test]
    fn test_group_sum_avg_first() {
        let engine = engine_with(vec![
            json!({"k": "a", "v": 1}),
            json!({"k": "b", "v": 10.5}),
            json!({"k": "a", "v": 3}),
            json!({"k": "a"}),
        ]);
        let pipeline = Pipeline::new().then(Stage::group(
            Expr::field("k"),
            [
                ("count", Accumulator::count()),
                ("total", Accumulator::Sum(Expr::field("v"))),
                ("avg", Accumulator::Avg(Expr::field("v"))),
                ("first", Accumulator::First(Expr::field("v"))),
            ],
        ));

        let out = run(&engine, pipeline);
        assert_eq!(out.len(), 2);
        // First-seen order.
        assert_eq!(out[0].get("_id"), Some(&json!("a")));
        assert_eq!(out[0].get("count"), Some(&json!(3)));
        assert_eq!(out[0].get("total"), Some(&json!(4)));
        assert_relative_eq!(out[0]["avg"].as_f64().unwrap(), 2.0);
        assert_eq!(out[0].get("first"), Some(&json!(1)));
        assert_relative_eq!(out[1]["total"].as_f64().unwrap(), 10.5);
    }

    #[test]
    fn test_avg_of_no_values_is_null() {
        let engine = engine_with(vec![json!({"k": "a"}), json!({"k": "a", "v": null})]);
        let pipeline = Pipeline::new().then(Stage::group(
            Expr::field("k"),
            [("avg", Accumulator::Avg(Expr::field("v")))],
        ));
        let out = run(&engine, pipeline);
        assert_eq!(out[0].get("avg"), Some(&Value::Null));
    }

    #[test]
    fn test_sort_is_stable_and_multi_key() {
        let engine = engine_with(vec![
            json!({"g": "PT", "m": 1, "tag": 1}),
            json!({"g": "ES", "m": 5, "tag": 2}),
            json!({"g": "PT", "m": 9, "tag": 3}),
            json!({"g": "PT", "m": 9, "tag": 4}),
        ]);
        let pipeline = Pipeline::new().then(Stage::sort([
            ("g", SortOrder::Ascending),
            ("m", SortOrder::Descending),
        ]));

        let tags: Vec<i64> = run(&engine, pipeline)
            .iter()
            .map(|d| d["tag"].as_i64().unwrap())
            .collect();
        assert_eq!(tags, vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_join_takes_all_matches() {
        let mut store = MemoryStore::default();
        store.replace_collection("eu", vec![doc(json!({"_id": "45"})), doc(json!({"_id": "99"}))]);
        store.replace_collection(
            "cpv",
            vec![
                doc(json!({"cpv_division": "45", "d": "Construction"})),
                doc(json!({"cpv_division": "45", "d": "Duplicate"})),
            ],
        );
        let engine = MemoryEngine::new(store, &EngineConfig::default());
        let pipeline = Pipeline::new()
            .then(Stage::join("cpv", "_id", "cpv_division", "ref"))
            .then(Stage::project([(
                "label",
                Expr::field("first.d"),
            ), ("first", Expr::first_elem(Expr::field("ref")))]));

        let out = run(&engine, pipeline);
        // Projection reads from the input document, so "first.d" is missing.
        assert!(out[0].get("label").is_none());
        assert_eq!(out[0]["first"]["d"], json!("Construction"));
        assert!(out[1].get("first").is_none());
    }

    #[test]
    fn test_substr_semantics() {
        let d = doc(json!({"cpv": "45233120", "short": "7", "num": 50123}));
        let sub = |field: &str| eval(&Expr::substr(Expr::field(field), 0, 2), &d).unwrap();
        assert_eq!(sub("cpv"), Some(json!("45")));
        assert_eq!(sub("short"), Some(json!("7")));
        assert_eq!(sub("num"), Some(json!("50")));
        assert_eq!(sub("missing"), Some(json!("")));
    }

    #[test]
    fn test_concat_and_subtract_nulls() {
        let d = doc(json!({"a": "x", "b": null, "n": 10, "m": 2.5}));
        let concat = Expr::concat(vec![Expr::field("a"), Expr::literal(" "), Expr::field("b")]);
        assert_eq!(eval(&concat, &d).unwrap(), Some(Value::Null));

        let diff = Expr::subtract(Expr::field("n"), Expr::field("m"));
        assert_eq!(eval(&diff, &d).unwrap(), Some(json!(7.5)));

        let diff = Expr::subtract(Expr::field("n"), Expr::field("missing"));
        assert_eq!(eval(&diff, &d).unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_date_millis("1970-01-02").unwrap(), 86_400_000);
        assert_eq!(parse_date_millis("02/01/1970").unwrap(), 86_400_000);
        assert_eq!(parse_date_millis("1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert_eq!(parse_date_millis("1970-01-01 00:01:00").unwrap(), 60_000);

        let err = parse_date_millis("not a date").unwrap_err();
        assert!(err.is_data_access());
    }

    #[test]
    fn test_malformed_date_fails_query() {
        let engine = engine_with(vec![json!({"d": "2016-13-45"})]);
        let pipeline = Pipeline::new().then(Stage::project([(
            "t",
            Expr::date_from_string(Expr::field("d")),
        )]));
        let err = engine
            .aggregate("eu", &pipeline, AggregateOptions::default())
            .unwrap_err();
        assert!(err.is_data_access());
    }

    #[test]
    fn test_group_limit_requires_disk_use() {
        let mut store = MemoryStore::default();
        store.replace_collection(
            "eu",
            (0..10).map(|i| doc(json!({"k": i}))).collect(),
        );
        let engine = MemoryEngine::new(store, &EngineConfig { max_groups_in_memory: 4 });
        let pipeline = Pipeline::new().then(Stage::group(Expr::field("k"), [("n", Accumulator::count())]));

        let err = engine
            .aggregate("eu", &pipeline, AggregateOptions::default())
            .unwrap_err();
        assert!(err.is_data_access());

        let out: Vec<_> = engine
            .aggregate("eu", &pipeline, AggregateOptions::allow_disk_use())
            .unwrap()
            .collect();
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_count_and_limit() {
        let engine = engine_with((0..7).map(|i| json!({"v": i})).collect());

        let out = run(&engine, Pipeline::new().then(Stage::Limit(3)).then(Stage::Count("result".into())));
        assert_eq!(out, vec![doc(json!({"result": 3}))]);

        let none = run(
            &engine,
            Pipeline::new()
                .then(Stage::Filter(Predicate::lt("v", 0)))
                .then(Stage::Count("result".into())),
        );
        assert!(none.is_empty());
    }
}
