//! Record Store Module
//!
//! In-memory home of every collection.
//!
//! ## Responsibilities
//! - Keep each collection's rows in insertion/mutation order
//! - Keep an identifier index consistent with the row list
//! - Hand out deep copies so callers never alias stored rows
//!
//! ## Data Structure Choice
//! Each collection is a `Vec<Row>` plus a `HashMap<String, usize>` from
//! identifier to position. Replacing a row keeps its position; removing one
//! re-indexes the rows that shifted. The store itself is not synchronized:
//! the engine wraps it in an `RwLock` and gates mutations with the lock
//! manager.

mod collection;

pub use collection::Collection;

use std::collections::{BTreeMap, HashMap};

use crate::document::Row;
use crate::error::{FolioError, Result};
use crate::registry::Registry;

/// Reject names that cannot map to exactly one snapshot file
/// (`{basename}.{name}.json`) inside the data directory
pub fn check_collection_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(&['/', '\\'][..]) {
        "name contains a path separator"
    } else if name.contains("..") {
        "name contains '..'"
    } else if name.chars().any(char::is_control) {
        "name contains a control character"
    } else {
        return Ok(());
    };

    Err(FolioError::InvalidCollectionName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Every collection plus the configuration registry
#[derive(Debug, Default, Clone)]
pub struct Store {
    collections: HashMap<String, Collection>,
    registry: Registry,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from snapshot contents
    pub fn from_parts(collections: HashMap<String, Vec<Row>>, registry: Registry) -> Self {
        let collections = collections
            .into_iter()
            .map(|(name, rows)| (name, Collection::from_rows(rows)))
            .collect();
        Self {
            collections,
            registry,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Get a collection, creating it on first write
    pub fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    /// Get a collection only if it already exists
    pub fn existing_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    /// Empty one collection (it stays registered, with no rows)
    pub fn drop_collection(&mut self, name: &str) {
        if let Some(collection) = self.collections.get_mut(name) {
            collection.clear();
        }
    }

    /// Remove every collection. Configurations are kept.
    pub fn clear(&mut self) {
        self.collections.clear();
    }

    /// Collection names in sorted order
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Deep copy of every collection, keyed by name
    pub fn dump(&self) -> BTreeMap<String, Vec<Row>> {
        self.collections
            .iter()
            .map(|(name, collection)| (name.clone(), collection.rows().to_vec()))
            .collect()
    }

    /// Total number of rows across all collections
    pub fn row_count(&self) -> usize {
        self.collections.values().map(Collection::len).sum()
    }
}
