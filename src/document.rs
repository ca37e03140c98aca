//! Document types
//!
//! A stored row pairs the caller's free-form record with engine-owned
//! metadata. Both halves serialize to the on-disk row shape:
//!
//! ```text
//! { "record": { ...fields, "_id": "..." },
//!   "_meta":  { "createdAt", "updatedAt", "version", "pk"?, "sk"?, "readonly"?, "schema"? } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FolioError, Result};

/// Reserved identifier field inside every record
pub const ID_FIELD: &str = "_id";

/// A schema-less record: field name → JSON value
pub type Document = Map<String, Value>;

/// Engine-managed metadata stored alongside each record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Lowercase hexadecimal revision counter, "0" on insert
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl Meta {
    /// Metadata for a freshly inserted record
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            version: "0".to_string(),
            pk: None,
            sk: None,
            readonly: None,
            schema: None,
        }
    }

    /// Metadata for the next revision: same creation time, new update time,
    /// version + 1
    pub fn next_revision(&self) -> Self {
        Self {
            updated_at: Utc::now(),
            version: bump_version(&self.version),
            ..self.clone()
        }
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

/// Increment a hexadecimal version string by one.
/// Unparseable versions restart the sequence at "1".
pub fn bump_version(version: &str) -> String {
    let current = u64::from_str_radix(version, 16).unwrap_or(0);
    format!("{:x}", current.wrapping_add(1))
}

/// A record as stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub record: Document,

    #[serde(rename = "_meta")]
    pub meta: Meta,
}

impl Row {
    pub fn new(record: Document, meta: Meta) -> Self {
        Self { record, meta }
    }

    /// The record identifier, if the record carries a string `_id`
    pub fn id(&self) -> Option<&str> {
        record_id(&self.record)
    }

    /// Decode a row from a JSON value (WAL payloads)
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Read the string `_id` of a record
pub fn record_id(record: &Document) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// The record's identifier, rejecting a `_id` that is present but not a string
pub fn checked_id(record: &Document) -> Result<Option<&str>> {
    match record.get(ID_FIELD) {
        None => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.as_str())),
        Some(other) => Err(FolioError::InvalidRecord(format!(
            "'{}' must be a string, got {}",
            ID_FIELD, other
        ))),
    }
}

/// Turn an arbitrary JSON value into a record, rejecting non-objects and
/// non-string identifiers
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => {
            checked_id(&map)?;
            Ok(map)
        }
        other => Err(FolioError::InvalidRecord(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}
