//! Turning raw aggregation output into the shapes the dashboard expects.

use crate::engine::Cursor;
use procure_core::{Error, Result, Value};
use serde::de::DeserializeOwned;

/// Deserialize every document of a cursor into a typed row.
pub fn shape_rows<T: DeserializeOwned>(cursor: Cursor) -> Result<Vec<T>> {
    cursor
        .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(Error::from))
        .collect()
}

/// Integer coercion for summary metrics: truncates toward zero.
#[inline]
pub fn truncate_to_int(value: f64) -> i64 {
    value.trunc() as i64
}

/// Read `field` from the single row of a scalar aggregate, truncated.
///
/// No row, or a row whose value is null, means there was nothing to
/// average over and fails with `EmptyAggregate`.
pub fn scalar_average(mut cursor: Cursor, field: &str) -> Result<i64> {
    let doc = cursor
        .next()
        .ok_or_else(|| Error::empty_aggregate(format!("no groups to average for '{field}'")))?;

    match doc.get(field).and_then(Value::as_f64) {
        Some(value) => Ok(truncate_to_int(value)),
        None => Err(Error::empty_aggregate(format!("'{field}' has no numeric value"))),
    }
}
