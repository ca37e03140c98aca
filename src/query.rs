//! Equality queries
//!
//! A query is a partial record. A candidate matches when every field named by
//! the query is present in the candidate and equal to the query's value.
//! Numbers compare by value, so `1` matches `1.0`; everything else compares
//! structurally. The empty query matches everything.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{record_id, Document, ID_FIELD};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Document);

impl Query {
    /// Query matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Query matching the record with the given identifier
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().field(ID_FIELD, Value::String(id.into()))
    }

    /// Add an equality constraint
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Build a query from a JSON object value
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self(crate::document::into_document(value)?))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `_id` constraint, if the query has one
    pub fn id(&self) -> Option<&str> {
        record_id(&self.0)
    }

    pub fn fields(&self) -> &Document {
        &self.0
    }

    pub fn matches(&self, record: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| {
                record
                    .get(field)
                    .map_or(false, |actual| values_equal(actual, expected))
            })
    }
}

/// JSON equality where numbers compare numerically.
///
/// Integers are compared exactly; a float on either side compares as `f64`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                // One negative i64 and one u64 above i64::MAX
                false
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

impl From<Document> for Query {
    fn from(fields: Document) -> Self {
        Self(fields)
    }
}
