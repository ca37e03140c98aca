//! Collection implementation
//!
//! Ordered row list plus identifier index.

use std::collections::HashMap;

use crate::document::Row;
use crate::query::Query;

/// Rows of one collection
#[derive(Debug, Default, Clone)]
pub struct Collection {
    rows: Vec<Row>,
    index: HashMap<String, usize>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from rows loaded off disk.
    /// Rows without an identifier cannot be indexed and are dropped; a
    /// repeated identifier keeps the later row at the earlier position.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut collection = Self::new();
        for row in rows {
            if row.id().is_none() {
                tracing::warn!("Skipping snapshot row without '_id'");
                continue;
            }
            collection.put(row);
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Point lookup by identifier
    pub fn get(&self, id: &str) -> Option<&Row> {
        self.index.get(id).map(|&pos| &self.rows[pos])
    }

    /// Rows in collection order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Linear scan for rows matching the query
    pub fn matching<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows.iter().filter(move |row| query.matches(&row.record))
    }

    /// Append a row. Returns false (and changes nothing) if the identifier is
    /// missing or already present.
    pub fn insert(&mut self, row: Row) -> bool {
        let id = match row.id() {
            Some(id) if !self.index.contains_key(id) => id.to_string(),
            _ => return false,
        };
        self.index.insert(id, self.rows.len());
        self.rows.push(row);
        true
    }

    /// Replace the row with the same identifier in place.
    /// Returns false if no such row exists.
    pub fn replace(&mut self, row: Row) -> bool {
        let pos = match row.id().and_then(|id| self.index.get(id)) {
            Some(&pos) => pos,
            None => return false,
        };
        self.rows[pos] = row;
        true
    }

    /// Replace in place when present, append otherwise
    pub fn put(&mut self, row: Row) {
        let existing = row.id().and_then(|id| self.index.get(id)).copied();
        match existing {
            Some(pos) => self.rows[pos] = row,
            None => {
                self.insert(row);
            }
        }
    }

    /// Remove a row by identifier
    pub fn remove(&mut self, id: &str) -> Option<Row> {
        let pos = self.index.remove(id)?;
        let row = self.rows.remove(pos);
        for shifted in &self.rows[pos..] {
            if let Some(shifted_id) = shifted.id() {
                if let Some(slot) = self.index.get_mut(shifted_id) {
                    *slot -= 1;
                }
            }
        }
        Some(row)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }
}
