//! Collection Configuration Registry
//!
//! Per-collection primary/secondary key declarations used to reject
//! duplicate (pk, sk) pairs on insert, update and upsert.
//!
//! On disk the registry is a single JSON object:
//! ```text
//! { "<collection>": { "pk": "<field>", "sk": "<field>" | null }, ... }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Row};
use crate::error::{FolioError, Result};
use crate::query::values_equal;
use crate::store::Collection;

/// Key declaration for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Field whose value must be unique (together with `sk` when set)
    pub pk: String,

    /// Optional second field forming a composite key with `pk`
    #[serde(default)]
    pub sk: Option<String>,
}

impl CollectionConfig {
    pub fn new(pk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: None,
        }
    }

    pub fn with_sk(mut self, sk: impl Into<String>) -> Self {
        self.sk = Some(sk.into());
        self
    }

    /// Extract the (pk, sk) values of a record.
    /// `None` when the record lacks the pk field: such records are exempt.
    pub fn key_of(&self, record: &Document) -> Option<(Value, Option<Value>)> {
        let pk = record.get(&self.pk)?.clone();
        let sk = self
            .sk
            .as_ref()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null));
        Some((pk, sk))
    }
}

/// Mapping collection name → key declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    configs: BTreeMap<String, CollectionConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, collection: &str, config: CollectionConfig) {
        self.configs.insert(collection.to_string(), config);
    }

    pub fn get(&self, collection: &str) -> Option<&CollectionConfig> {
        self.configs.get(collection)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CollectionConfig)> {
        self.configs.iter()
    }

    /// Fail with `DuplicateKey` if `record` would share its (pk, sk) pair with
    /// a row of `existing` other than the one identified by `exclude_id`.
    pub fn check_unique(
        &self,
        collection: &str,
        existing: Option<&Collection>,
        record: &Document,
        exclude_id: Option<&str>,
    ) -> Result<()> {
        let (config, existing) = match (self.get(collection), existing) {
            (Some(config), Some(existing)) => (config, existing),
            _ => return Ok(()),
        };
        let key = match config.key_of(record) {
            Some(key) => key,
            None => return Ok(()),
        };

        let clash = existing
            .iter()
            .filter(|row| exclude_id.map_or(true, |id| row.id() != Some(id)))
            .any(|row| {
                config
                    .key_of(&row.record)
                    .map_or(false, |other| keys_equal(&other, &key))
            });

        if clash {
            return Err(FolioError::DuplicateKey {
                collection: collection.to_string(),
                key: describe_key(config, &key),
            });
        }
        Ok(())
    }

    /// Copy the configured key values into the row's metadata
    pub fn stamp(&self, collection: &str, row: &mut Row) {
        let key = self
            .get(collection)
            .and_then(|config| config.key_of(&row.record));
        match key {
            Some((pk, sk)) => {
                row.meta.pk = Some(pk);
                row.meta.sk = sk;
            }
            None => {
                row.meta.pk = None;
                row.meta.sk = None;
            }
        }
    }
}

fn keys_equal(a: &(Value, Option<Value>), b: &(Value, Option<Value>)) -> bool {
    values_equal(&a.0, &b.0)
        && match (&a.1, &b.1) {
            (Some(x), Some(y)) => values_equal(x, y),
            (None, None) => true,
            _ => false,
        }
}

fn describe_key(config: &CollectionConfig, key: &(Value, Option<Value>)) -> String {
    match (&config.sk, &key.1) {
        (Some(sk), Some(sk_value)) => format!("{}={}, {}={}", config.pk, key.0, sk, sk_value),
        _ => format!("{}={}", config.pk, key.0),
    }
}
