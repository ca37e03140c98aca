//! Engine Module
//!
//! The document store that coordinates all components.
//!
//! ## Responsibilities
//! - Load snapshots and replay the WAL on startup
//! - Run every mutation as Lock → Validate → Append(WAL) → Apply → Unlock
//! - Enqueue commits after writes when auto-commit is on
//! - Flush the full state to snapshot files, then truncate the WAL

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use serde_json::Value;
use uuid::Uuid;

use crate::commit::{CommitScheduler, Flusher};
use crate::config::Config;
use crate::document::{checked_id, Document, Meta, Row, ID_FIELD};
use crate::error::{FolioError, Result};
use crate::lock::{LockGuard, LockManager};
use crate::query::Query;
use crate::registry::{CollectionConfig, Registry};
use crate::storage::SnapshotStore;
use crate::store::{check_collection_name, Store};
use crate::wal::{Operation, RecoveryResult, WalEntry, WalRecovery, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model
///
/// All methods take `&self`; share the engine across threads with `Arc`.
///
/// - **Reads** (find/count/sample/...): take the store's read lock only
/// - **Mutations**: take a logical lock from the `LockManager` without
///   waiting (a held resource fails the call with `LockConflict`), then hold
///   the WAL mutex from validation through apply so log order, memory order
///   and uniqueness checks agree
/// - **Flush**: `disk_lock` → WAL mutex → store; no two flushes overlap and no
///   mutation can slip between the snapshot and the truncate
///
/// Lock order is always disk_lock → wal → store.
pub struct Engine {
    inner: Arc<EngineInner>,

    /// Single ordered commit queue (worker thread)
    scheduler: CommitScheduler,

    /// Outcome of the WAL replay performed by `open`
    recovery: RecoveryResult,
}

/// State shared with the commit worker
struct EngineInner {
    config: Config,

    wal_path: PathBuf,

    /// Collections and registry
    store: RwLock<Store>,

    /// WAL writer; `None` in memory-only mode. Held by every mutation.
    wal: Mutex<Option<WalWriter>>,

    /// Snapshot files; `None` in memory-only mode
    snapshots: Option<SnapshotStore>,

    /// Advisory collection/row locks
    locks: LockManager,

    /// Serializes flushes and registry writes
    disk_lock: Mutex<()>,
}

/// In-memory effect of one logged operation
enum Mutation {
    Put(Row),
    Remove(String),
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config, create directories
    /// 2. Load the registry and collection snapshots
    /// 3. Replay the WAL without re-logging
    /// 4. Flush so the replayed state is in the snapshots and the WAL is empty
    /// 5. Start the commit worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let wal_path = config.resolved_wal_path();

        let (store, wal, snapshots) = if config.memory_only {
            (Store::new(), None, None)
        } else {
            let snapshots = SnapshotStore::open(&config)?;
            let snapshot = snapshots.load()?;
            let store = Store::from_parts(snapshot.collections, snapshot.registry);
            let wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
            (store, Some(wal), Some(snapshots))
        };

        tracing::info!(
            path = %config.db_path.display(),
            collections = store.collection_names().len(),
            rows = store.row_count(),
            memory_only = config.memory_only,
            "Opened store"
        );

        let inner = Arc::new(EngineInner {
            config,
            wal_path,
            store: RwLock::new(store),
            wal: Mutex::new(wal),
            snapshots,
            locks: LockManager::new(),
            disk_lock: Mutex::new(()),
        });

        let recovery = inner.recover()?;
        let scheduler =
            CommitScheduler::spawn(Arc::clone(&inner), inner.config.max_writes_before_flush)?;

        Ok(Self {
            inner,
            scheduler,
            recovery,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified primary file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().db_path(path).build();
        Self::open(config)
    }

    /// Open a store that never touches the disk
    pub fn open_in_memory() -> Result<Self> {
        let config = Config::builder().memory_only(true).build();
        Self::open(config)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert a record and return its identifier
    ///
    /// A string `_id` already in the record is used as the identifier;
    /// otherwise a UUID v4 is generated. Fails with `DuplicateKey` if the
    /// identifier or the configured (pk, sk) pair is taken, and with
    /// `LockConflict` if the row is locked.
    pub fn insert_one(&self, collection: &str, record: Document) -> Result<String> {
        check_collection_name(collection)?;
        let id = match checked_id(&record)? {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let _guard = self.inner.locks.try_acquire(collection, Some(id.as_str()))?;
        self.inner.insert_record(collection, &id, record)?;
        self.after_write();
        Ok(id)
    }

    /// Insert records one at a time
    ///
    /// Not atomic: on failure the records before the failing one stay
    /// inserted and the error is returned.
    pub fn insert_many(&self, collection: &str, records: Vec<Document>) -> Result<Vec<String>> {
        records
            .into_iter()
            .map(|record| self.insert_one(collection, record))
            .collect()
    }

    /// Merge `partial` into the first record matching `query`
    ///
    /// Returns false if nothing matches. The `_id` of the target never
    /// changes; the version is bumped by one.
    pub fn update_one(&self, collection: &str, query: &Query, partial: Document) -> Result<bool> {
        check_collection_name(collection)?;
        let id = match self.first_match_id(collection, query) {
            Some(id) => id,
            None => return Ok(false),
        };

        let _guard = self.inner.locks.try_acquire(collection, Some(id.as_str()))?;
        let updated = self.inner.update_record(collection, query, &id, partial)?;
        if updated {
            self.after_write();
        }
        Ok(updated)
    }

    /// Delete the first record matching `query`
    ///
    /// Returns false if nothing matches.
    pub fn delete_one(&self, collection: &str, query: &Query) -> Result<bool> {
        check_collection_name(collection)?;
        let id = match self.first_match_id(collection, query) {
            Some(id) => id,
            None => return Ok(false),
        };

        let _guard = self.inner.locks.try_acquire(collection, Some(id.as_str()))?;
        let deleted = self.inner.delete_record(collection, query, &id)?;
        if deleted {
            self.after_write();
        }
        Ok(deleted)
    }

    /// Delete every record matching `query`, one at a time
    ///
    /// Returns the number deleted. Not atomic: an error stops the loop and
    /// leaves earlier deletions in place.
    pub fn delete_many(&self, collection: &str, query: &Query) -> Result<usize> {
        check_collection_name(collection)?;
        let ids: Vec<String> = {
            let store = self.inner.store.read();
            match store.collection(collection) {
                Some(rows) => rows
                    .matching(query)
                    .filter_map(|row| row.id().map(str::to_string))
                    .collect(),
                None => return Ok(0),
            }
        };

        let mut deleted = 0;
        for id in ids {
            let _guard = self.inner.locks.try_acquire(collection, Some(id.as_str()))?;
            if self.inner.delete_record(collection, query, &id)? {
                deleted += 1;
                self.after_write();
            }
        }
        Ok(deleted)
    }

    /// Update the first record matching `query`, or insert `record` if none
    ///
    /// Holds the collection lock across the existence check and the write,
    /// so two upserts cannot both decide to insert. The update branch keeps
    /// `createdAt`, bumps `updatedAt` and the version, and re-checks pk/sk.
    /// The insert branch takes the identifier from the record's `_id`, then
    /// the query's `_id`, then generates one. Returns the identifier.
    pub fn upsert(&self, collection: &str, query: &Query, record: Document) -> Result<String> {
        check_collection_name(collection)?;
        let _guard = self.inner.locks.try_acquire(collection, None)?;

        let id = match self.first_match_id(collection, query) {
            Some(id) => {
                self.inner.update_record(collection, query, &id, record)?;
                id
            }
            None => {
                let id = match (checked_id(&record)?, query.id()) {
                    (Some(id), _) | (None, Some(id)) => id.to_string(),
                    (None, None) => Uuid::new_v4().to_string(),
                };
                self.inner.insert_record(collection, &id, record)?;
                id
            }
        };

        self.after_write();
        Ok(id)
    }

    /// Empty one collection and make that durable
    pub fn drop_collection(&self, collection: &str) -> Result<()> {
        check_collection_name(collection)?;
        let _guard = self.inner.locks.try_acquire(collection, None)?;
        tracing::info!(collection, "Dropping collection");
        self.inner.checkpoint(|store| store.drop_collection(collection))
    }

    /// Remove every collection and make that durable
    ///
    /// The empty state is written to the snapshots (deleting the collection
    /// files) before the WAL is truncated, so a restart cannot bring the
    /// cleared rows back. Collection configurations are kept.
    pub fn clear(&self) -> Result<()> {
        let names = self.collection_names();
        let _guards = names
            .iter()
            .map(|name| self.inner.locks.try_acquire(name, None))
            .collect::<Result<Vec<LockGuard<'_>>>>()?;

        tracing::info!(collections = names.len(), "Clearing store");
        self.inner.checkpoint(Store::clear)
    }

    /// Declare the primary (and optional secondary) key of a collection
    /// and persist the registry
    pub fn configure(&self, collection: &str, config: CollectionConfig) -> Result<()> {
        check_collection_name(collection)?;
        let _guard = self.inner.locks.try_acquire(collection, None)?;
        self.inner.configure(collection, config)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copies of every record matching `query`, in collection order
    pub fn find(&self, collection: &str, query: &Query) -> Vec<Row> {
        let store = self.inner.store.read();
        match store.collection(collection) {
            Some(rows) => rows.matching(query).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Copy of the first record matching `query`
    pub fn find_one(&self, collection: &str, query: &Query) -> Option<Row> {
        let store = self.inner.store.read();
        store
            .collection(collection)
            .and_then(|rows| rows.matching(query).next().cloned())
    }

    /// Number of records matching `query`
    pub fn count(&self, collection: &str, query: &Query) -> usize {
        let store = self.inner.store.read();
        store
            .collection(collection)
            .map_or(0, |rows| rows.matching(query).count())
    }

    /// Draw `n` matching records without replacement, in random order
    ///
    /// The result always has length `n`; slots beyond the number of matches
    /// are `None`.
    pub fn sample(&self, collection: &str, query: &Query, n: usize) -> Vec<Option<Row>> {
        let mut rng = rand::thread_rng();
        let mut picked: Vec<Option<Row>> = {
            let store = self.inner.store.read();
            let matches: Vec<&Row> = store
                .collection(collection)
                .map(|rows| rows.matching(query).collect())
                .unwrap_or_default();
            matches
                .choose_multiple(&mut rng, n)
                .map(|row| Some((*row).clone()))
                .collect()
        };

        picked.shuffle(&mut rng);
        picked.resize(n, None);
        picked
    }

    /// Key declaration of a collection, if any
    pub fn get_configuration(&self, collection: &str) -> Option<CollectionConfig> {
        self.inner.store.read().registry().get(collection).cloned()
    }

    /// Copy of every collection's rows
    pub fn get_data(&self) -> BTreeMap<String, Vec<Row>> {
        self.inner.store.read().dump()
    }

    /// Names of all collections, sorted
    pub fn collection_names(&self) -> Vec<String> {
        self.inner.store.read().collection_names()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Count one write and flush if the threshold is reached
    ///
    /// Goes through the same ordered queue as automatic commits and waits for
    /// its turn. Returns true if this call flushed.
    pub fn commit(&self) -> Result<bool> {
        self.scheduler.commit()
    }

    /// Write the full state to the snapshot files, then truncate the WAL
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    /// Drain queued commits, flush, and sync the WAL
    pub fn shutdown(self) -> Result<()> {
        let Engine {
            inner, scheduler, ..
        } = self;

        scheduler.shutdown()?;
        inner.flush()?;
        if let Some(writer) = inner.wal.lock().as_mut() {
            writer.sync()?;
        }
        tracing::info!("Store shut down");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the WAL file path
    pub fn wal_path(&self) -> &Path {
        &self.inner.wal_path
    }

    /// Commits counted since the last threshold flush
    pub fn pending_writes(&self) -> usize {
        self.scheduler.pending_writes()
    }

    /// Block until all queued commits have been processed
    pub fn wait_for_commits(&self) -> Result<()> {
        self.scheduler.wait_idle()
    }

    /// Get the lock manager
    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.locks
    }

    /// Outcome of the WAL replay performed on open
    pub fn last_recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn first_match_id(&self, collection: &str, query: &Query) -> Option<String> {
        let store = self.inner.store.read();
        let id = store
            .collection(collection)?
            .matching(query)
            .next()
            .and_then(|row| row.id().map(str::to_string));
        id
    }

    fn after_write(&self) {
        if !self.inner.config.auto_commit {
            return;
        }
        if let Err(e) = self.scheduler.enqueue() {
            tracing::warn!(error = %e, "Failed to enqueue commit");
        }
    }
}

impl EngineInner {
    /// Validate, log and apply an insert. Caller holds the row lock.
    fn insert_record(&self, collection: &str, id: &str, mut record: Document) -> Result<()> {
        record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        let mut row = Row::new(record, Meta::new());

        let mut wal = self.wal.lock();
        {
            let store = self.store.read();
            let existing = store.collection(collection);
            if existing.map_or(false, |rows| rows.contains(id)) {
                return Err(FolioError::DuplicateKey {
                    collection: collection.to_string(),
                    key: format!("{}={}", ID_FIELD, id),
                });
            }
            store
                .registry()
                .check_unique(collection, existing, &row.record, None)?;
            store.registry().stamp(collection, &mut row);
        }

        let entry = WalEntry::insert(collection, &row)?;
        self.append_and_apply(&mut wal, &entry, Mutation::Put(row), false)?;
        tracing::debug!(collection, id, "Inserted record");
        Ok(())
    }

    /// Validate, log and apply an update of row `id`.
    /// Returns false if the row is gone or no longer matches `query`.
    fn update_record(
        &self,
        collection: &str,
        query: &Query,
        id: &str,
        partial: Document,
    ) -> Result<bool> {
        let mut wal = self.wal.lock();
        let row = {
            let store = self.store.read();
            let existing = store.collection(collection);
            let current = match existing.and_then(|rows| rows.get(id)) {
                Some(row) if query.matches(&row.record) => row,
                _ => return Ok(false),
            };

            let mut record = current.record.clone();
            for (field, value) in partial {
                if field != ID_FIELD {
                    record.insert(field, value);
                }
            }

            let mut row = Row::new(record, current.meta.next_revision());
            store
                .registry()
                .check_unique(collection, existing, &row.record, Some(id))?;
            store.registry().stamp(collection, &mut row);
            row
        };

        let entry = WalEntry::update(collection, query, &row)?;
        let version = row.meta.version.clone();
        self.append_and_apply(&mut wal, &entry, Mutation::Put(row), false)?;
        tracing::debug!(collection, id, version = %version, "Updated record");
        Ok(true)
    }

    /// Log and apply the deletion of row `id`.
    /// Returns false if the row is gone or no longer matches `query`.
    fn delete_record(&self, collection: &str, query: &Query, id: &str) -> Result<bool> {
        let mut wal = self.wal.lock();
        {
            let store = self.store.read();
            let still_matches = store
                .collection(collection)
                .and_then(|rows| rows.get(id))
                .map_or(false, |row| query.matches(&row.record));
            if !still_matches {
                return Ok(false);
            }
        }

        let entry = WalEntry::delete(collection, Query::by_id(id));
        self.append_and_apply(&mut wal, &entry, Mutation::Remove(id.to_string()), false)?;
        tracing::debug!(collection, id, "Deleted record");
        Ok(true)
    }

    /// Append the entry (unless `skip`), then apply its effect.
    /// Caller holds the WAL mutex; a failed append leaves memory untouched.
    fn append_and_apply(
        &self,
        wal: &mut Option<WalWriter>,
        entry: &WalEntry,
        mutation: Mutation,
        skip: bool,
    ) -> Result<()> {
        if let Some(writer) = wal.as_mut() {
            writer.append(entry, skip)?;
        }

        let mut store = self.store.write();
        match mutation {
            Mutation::Put(row) => store.collection_mut(&entry.collection).put(row),
            Mutation::Remove(id) => {
                if let Some(rows) = store.existing_mut(&entry.collection) {
                    rows.remove(&id);
                }
            }
        }
        Ok(())
    }

    /// Re-apply one logged operation without logging it again.
    ///
    /// Idempotent: the snapshot may already contain the effect if the
    /// process died between writing the snapshots and truncating the WAL.
    fn replay_entry(&self, entry: WalEntry) -> Result<()> {
        check_collection_name(&entry.collection)?;
        let mutation = match entry.op {
            Operation::Insert | Operation::Update => {
                let row = entry.row()?;
                if row.id().is_none() {
                    return Err(FolioError::InvalidRecord(format!(
                        "logged {:?} for '{}' has no '{}'",
                        entry.op, entry.collection, ID_FIELD
                    )));
                }
                Mutation::Put(row)
            }
            Operation::Delete => match self.resolve_logged_delete(&entry) {
                Some(id) => Mutation::Remove(id),
                None => return Ok(()),
            },
        };

        let mut wal = self.wal.lock();
        self.append_and_apply(&mut wal, &entry, mutation, true)
    }

    /// Identifier targeted by a logged delete, if the row is still present
    fn resolve_logged_delete(&self, entry: &WalEntry) -> Option<String> {
        let query = entry.query.as_ref()?;
        let store = self.store.read();
        let rows = store.collection(&entry.collection)?;
        let id = match query.id() {
            Some(id) if rows.contains(id) => Some(id.to_string()),
            Some(_) => None,
            None => rows
                .matching(query)
                .next()
                .and_then(|row| row.id().map(str::to_string)),
        };
        id
    }

    /// Replay the WAL, then fold the result into fresh snapshots
    fn recover(&self) -> Result<RecoveryResult> {
        if self.config.memory_only {
            return Ok(RecoveryResult::default());
        }

        let result = WalRecovery::replay(&self.wal_path, |entry| self.replay_entry(entry))?;
        if result.entries_recovered > 0 || result.entries_corrupted > 0 {
            tracing::info!(
                recovered = result.entries_recovered,
                skipped = result.entries_corrupted,
                "WAL replay finished"
            );
        }
        for skipped in &result.skipped {
            tracing::warn!(line = skipped.line, reason = %skipped.reason, "WAL line not recovered");
        }

        // Recovered operations become durable in the snapshots; the WAL is
        // truncated only after that succeeds
        self.flush()?;
        Ok(result)
    }

    fn configure(&self, collection: &str, config: CollectionConfig) -> Result<()> {
        let _disk = self.disk_lock.lock();
        let registry = {
            let mut store = self.store.write();
            store.registry_mut().configure(collection, config);
            store.registry().clone()
        };

        if let Some(snapshots) = &self.snapshots {
            snapshots.write_registry(&registry)?;
        }
        tracing::info!(collection, "Configured collection keys");
        Ok(())
    }

    /// Persist the current state and truncate the WAL.
    ///
    /// Any write failure returns before the truncate, so every logged
    /// operation stays recoverable.
    fn flush_snapshots(&self) -> Result<()> {
        let _disk = self.disk_lock.lock();
        let mut wal = self.wal.lock();

        let (collections, registry) = {
            let store = self.store.read();
            (store.dump(), store.registry().clone())
        };
        self.persist(&mut wal, &collections, &registry)
    }

    /// Apply `mutate` to a copy of the store, persist the copy, truncate the
    /// WAL, and only then install the copy as the live state.
    ///
    /// A failed write leaves memory, snapshots and WAL exactly as they were.
    fn checkpoint<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Store),
    {
        let _disk = self.disk_lock.lock();
        let mut wal = self.wal.lock();

        // Every mutation holds the WAL mutex while applying, so the copy
        // cannot go stale before it is installed
        let mut next = self.store.read().clone();
        mutate(&mut next);

        self.persist(&mut wal, &next.dump(), next.registry())?;
        *self.store.write() = next;
        Ok(())
    }

    /// Write every snapshot file, then truncate the WAL.
    /// Caller holds `disk_lock` and the WAL mutex.
    fn persist(
        &self,
        wal: &mut Option<WalWriter>,
        collections: &BTreeMap<String, Vec<Row>>,
        registry: &Registry,
    ) -> Result<()> {
        let snapshots = match &self.snapshots {
            Some(snapshots) => snapshots,
            None => return Ok(()),
        };

        snapshots.write_all(collections, registry)?;
        if let Some(writer) = wal.as_mut() {
            writer.truncate(false)?;
        }

        tracing::debug!(collections = collections.len(), "Flushed snapshots and truncated WAL");
        Ok(())
    }
}

impl Flusher for EngineInner {
    fn flush(&self) -> Result<()> {
        self.flush_snapshots()
    }
}
