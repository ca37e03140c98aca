//! Lock Manager
//!
//! Advisory, non-blocking collection and row locks.
//!
//! ## Conflict Rules
//! - A collection lock conflicts with any lock on the same collection
//! - A row lock conflicts with the collection lock and with a row lock on the
//!   same identifier; row locks on different identifiers coexist
//!
//! Acquisition never waits: a held resource makes `acquire` return false and
//! `try_acquire` return `FolioError::LockConflict`. Locks live only in memory
//! and only for the duration of one operation. `LockGuard` releases on drop,
//! so every exit path of the protected operation unlocks.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{FolioError, Result};

#[derive(Debug, Default)]
struct Holds {
    collection: bool,
    rows: HashSet<String>,
}

impl Holds {
    fn is_idle(&self) -> bool {
        !self.collection && self.rows.is_empty()
    }
}

/// Tracks which collections and rows are currently locked
#[derive(Debug, Default)]
pub struct LockManager {
    held: Mutex<HashMap<String, Holds>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to lock a whole collection (`id = None`) or one row.
    /// Returns false immediately if the resource is already held.
    pub fn acquire(&self, collection: &str, id: Option<&str>) -> bool {
        let mut held = self.held.lock();
        let holds = held.entry(collection.to_string()).or_default();

        let acquired = match id {
            None => {
                if holds.is_idle() {
                    holds.collection = true;
                    true
                } else {
                    false
                }
            }
            Some(id) => !holds.collection && holds.rows.insert(id.to_string()),
        };

        if !acquired && holds.is_idle() {
            held.remove(collection);
        }
        acquired
    }

    /// Release a lock. Releasing something not held is a no-op.
    pub fn release(&self, collection: &str, id: Option<&str>) {
        let mut held = self.held.lock();
        let now_idle = match held.get_mut(collection) {
            Some(holds) => {
                match id {
                    None => holds.collection = false,
                    Some(id) => {
                        holds.rows.remove(id);
                    }
                }
                holds.is_idle()
            }
            None => return,
        };
        if now_idle {
            held.remove(collection);
        }
    }

    /// Scoped acquisition: the returned guard releases the lock when dropped
    pub fn try_acquire(&self, collection: &str, id: Option<&str>) -> Result<LockGuard<'_>> {
        if !self.acquire(collection, id) {
            tracing::debug!(collection, id = ?id, "Lock conflict");
            return Err(FolioError::LockConflict {
                collection: collection.to_string(),
                id: id.map(str::to_string),
            });
        }
        Ok(LockGuard {
            manager: self,
            collection: collection.to_string(),
            id: id.map(str::to_string),
        })
    }

    /// Whether the collection lock or the given row lock is held
    pub fn is_locked(&self, collection: &str, id: Option<&str>) -> bool {
        let held = self.held.lock();
        match (held.get(collection), id) {
            (None, _) => false,
            (Some(holds), None) => holds.collection,
            (Some(holds), Some(id)) => holds.collection || holds.rows.contains(id),
        }
    }

    /// Number of collections with at least one lock held
    pub fn active_collections(&self) -> usize {
        self.held.lock().len()
    }
}

/// RAII handle for a lock taken through `LockManager::try_acquire`
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    collection: String,
    id: Option<String>,
}

impl LockGuard<'_> {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.collection, self.id.as_deref());
    }
}
