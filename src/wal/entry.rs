//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Row;
use crate::error::{FolioError, Result};
use crate::query::Query;

/// A single entry in the WAL, one JSON object per line:
/// `{ "op": "insert"|"update"|"delete", "collection": ..., "data"?: ..., "query"?: ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// The operation to perform
    pub op: Operation,

    /// Target collection
    pub collection: String,

    /// Full post-image row (insert/update)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Query identifying the target (update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
}

/// Operations that can be logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl WalEntry {
    pub fn insert(collection: &str, row: &Row) -> Result<Self> {
        Ok(Self {
            op: Operation::Insert,
            collection: collection.to_string(),
            data: Some(row.to_value()?),
            query: None,
        })
    }

    pub fn update(collection: &str, query: &Query, row: &Row) -> Result<Self> {
        Ok(Self {
            op: Operation::Update,
            collection: collection.to_string(),
            data: Some(row.to_value()?),
            query: Some(query.clone()),
        })
    }

    pub fn delete(collection: &str, query: Query) -> Self {
        Self {
            op: Operation::Delete,
            collection: collection.to_string(),
            data: None,
            query: Some(query),
        }
    }

    /// Decode the post-image row carried by insert/update entries
    pub fn row(&self) -> Result<Row> {
        match &self.data {
            Some(data) => Row::from_value(data.clone()),
            None => Err(FolioError::Serialization(format!(
                "{:?} entry for '{}' carries no data",
                self.op, self.collection
            ))),
        }
    }

    /// Encode as one line of JSON, without the trailing newline
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one line of JSON
    pub fn deserialize(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
