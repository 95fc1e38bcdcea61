//! Fixed-boundary bucketing.
//!
//! Counts values into half-open `[lower, upper)` buckets. Anything that is
//! not a number or falls outside the boundaries lands in a default bucket.

use procure_core::{fields, Document, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of an emitted bucket: its lower edge, or the default label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketLabel {
    Lower(i64),
    Other(String),
}

impl fmt::Display for BucketLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketLabel::Lower(edge) => write!(f, "{edge}"),
            BucketLabel::Other(label) => f.write_str(label),
        }
    }
}

/// Validated bucket boundaries.
#[derive(Debug, Clone)]
pub struct Buckets {
    edges: Vec<f64>,
    labels: Vec<Value>,
}

impl Buckets {
    /// Boundaries must be numeric, strictly increasing, and at least two.
    pub fn new(boundaries: &[Value]) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(Error::data_access("bucket needs at least two boundaries"));
        }

        let mut edges = Vec::with_capacity(boundaries.len());
        for boundary in boundaries {
            let edge = boundary
                .as_f64()
                .ok_or_else(|| Error::data_access(format!("bucket boundary {boundary} is not a number")))?;
            if let Some(&prev) = edges.last() {
                if edge <= prev {
                    return Err(Error::data_access("bucket boundaries must be strictly increasing"));
                }
            }
            edges.push(edge);
        }

        Ok(Self {
            edges,
            labels: boundaries.to_vec(),
        })
    }

    /// Number of regular buckets.
    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the regular bucket containing `value`.
    pub fn index_of(&self, value: f64) -> Option<usize> {
        let first = *self.edges.first()?;
        let last = *self.edges.last()?;
        if value.is_nan() || value < first || value >= last {
            return None;
        }
        // Number of edges <= value, minus one.
        Some(self.edges.partition_point(|&edge| edge <= value) - 1)
    }

    /// Count values and emit one document per non-empty bucket, ordered by
    /// boundary with the default bucket last.
    pub fn count<'a>(
        &self,
        values: impl IntoIterator<Item = Option<&'a Value>>,
        default_label: &str,
    ) -> Vec<Document> {
        let mut counts = vec![0u64; self.len()];
        let mut overflow = 0u64;

        for value in values {
            match value.and_then(Value::as_f64).and_then(|v| self.index_of(v)) {
                Some(idx) => counts[idx] += 1,
                None => overflow += 1,
            }
        }

        let mut out = Vec::new();
        for (idx, &count) in counts.iter().enumerate() {
            if count > 0 {
                out.push(bucket_doc(self.labels[idx].clone(), count));
            }
        }
        if overflow > 0 {
            out.push(bucket_doc(Value::from(default_label), overflow));
        }
        out
    }
}

fn bucket_doc(id: Value, count: u64) -> Document {
    let mut doc = Document::new();
    doc.insert(fields::ID.to_string(), id);
    doc.insert("count".to_string(), Value::from(count));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear() -> Buckets {
        let edges: Vec<Value> = (0..=10).map(|i| json!(i * 100_000)).collect();
        Buckets::new(&edges).unwrap()
    }

    #[test]
    fn test_half_open_edges() {
        let buckets = linear();
        assert_eq!(buckets.len(), 10);
        assert_eq!(buckets.index_of(0.0), Some(0));
        assert_eq!(buckets.index_of(99_999.99), Some(0));
        assert_eq!(buckets.index_of(100_000.0), Some(1));
        assert_eq!(buckets.index_of(999_999.0), Some(9));
        assert_eq!(buckets.index_of(1_000_000.0), None);
        assert_eq!(buckets.index_of(-1.0), None);
    }

    #[test]
    fn test_count_emits_non_empty_buckets() {
        let buckets = linear();
        let values = [json!(5), json!(150_000), json!(199_999), json!(2_500_000), json!("n/a")];
        let docs = buckets.count(values.iter().map(Some), ">1000000");

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].get("_id"), Some(&json!(0)));
        assert_eq!(docs[0].get("count"), Some(&json!(1)));
        assert_eq!(docs[1].get("_id"), Some(&json!(100_000)));
        assert_eq!(docs[1].get("count"), Some(&json!(2)));
        assert_eq!(docs[2].get("_id"), Some(&json!(">1000000")));
        assert_eq!(docs[2].get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_rejects_bad_boundaries() {
        assert!(Buckets::new(&[json!(0)]).is_err());
        assert!(Buckets::new(&[json!(0), json!(0)]).is_err());
        assert!(Buckets::new(&[json!(0), json!("x")]).is_err());
    }

    #[test]
    fn test_label_deserializes() {
        let label: BucketLabel = serde_json::from_value(json!(200_000)).unwrap();
        assert_eq!(label, BucketLabel::Lower(200_000));
        let label: BucketLabel = serde_json::from_value(json!(">1000000")).unwrap();
        assert_eq!(label.to_string(), ">1000000");
    }
}
