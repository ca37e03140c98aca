//! Tests for the commit scheduler
//!
//! These tests verify:
//! - Every N-th commit triggers exactly one flush
//! - A failed flush keeps the counter so the next commit retries
//! - Fire-and-forget commits are processed in order
//! - Engine auto-commit feeds the scheduler

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use folio::commit::{CommitScheduler, Flusher};
use folio::config::Config;
use folio::{Document, Engine, FolioError, Query};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Types
// =============================================================================

#[derive(Default)]
struct CountingFlusher {
    flushes: AtomicUsize,
    fail: AtomicBool,
}

impl Flusher for CountingFlusher {
    fn flush(&self) -> folio::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FolioError::Storage("disk full".to_string()));
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn setup_scheduler(threshold: usize) -> (Arc<CountingFlusher>, CommitScheduler) {
    let flusher = Arc::new(CountingFlusher::default());
    let scheduler = CommitScheduler::spawn(Arc::clone(&flusher), threshold).unwrap();
    (flusher, scheduler)
}

fn doc(n: usize) -> Document {
    match json!({ "n": n }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

// =============================================================================
// Scheduler Tests
// =============================================================================

#[test]
fn test_zero_threshold_rejected() {
    let flusher = Arc::new(CountingFlusher::default());
    assert!(CommitScheduler::spawn(flusher, 0).is_err());
}

#[test]
fn test_flush_every_nth_commit() {
    let (flusher, scheduler) = setup_scheduler(3);

    let outcomes: Vec<bool> = (0..7).map(|_| scheduler.commit().unwrap()).collect();

    assert_eq!(
        outcomes,
        vec![false, false, true, false, false, true, false]
    );
    assert_eq!(flusher.flushes.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.pending_writes(), 1);
    assert_eq!(scheduler.threshold(), 3);
}

#[test]
fn test_threshold_of_one_flushes_every_commit() {
    let (flusher, scheduler) = setup_scheduler(1);

    assert!(scheduler.commit().unwrap());
    assert!(scheduler.commit().unwrap());

    assert_eq!(flusher.flushes.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.pending_writes(), 0);
}

#[test]
fn test_failed_flush_keeps_counter_and_retries() {
    let (flusher, scheduler) = setup_scheduler(2);
    flusher.fail.store(true, Ordering::SeqCst);

    assert!(!scheduler.commit().unwrap());
    assert!(scheduler.commit().is_err());
    assert_eq!(scheduler.pending_writes(), 2);

    flusher.fail.store(false, Ordering::SeqCst);
    assert!(scheduler.commit().unwrap());
    assert_eq!(scheduler.pending_writes(), 0);
    assert_eq!(flusher.flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enqueued_commits_are_processed_in_order() {
    let (flusher, scheduler) = setup_scheduler(4);

    for _ in 0..10 {
        scheduler.enqueue().unwrap();
    }
    scheduler.wait_idle().unwrap();

    assert_eq!(flusher.flushes.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.pending_writes(), 2);
}

#[test]
fn test_shutdown_drains_queue() {
    let (flusher, scheduler) = setup_scheduler(5);

    for _ in 0..5 {
        scheduler.enqueue().unwrap();
    }
    scheduler.shutdown().unwrap();

    assert_eq!(flusher.flushes.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Engine Integration Tests
// =============================================================================

#[test]
fn test_engine_auto_commit_flushes_at_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .db_path(temp_dir.path().join("db.json"))
        .max_writes_before_flush(3)
        .build();
    let engine = Engine::open(config).unwrap();

    for i in 0..2 {
        engine.insert_one("people", doc(i)).unwrap();
    }
    engine.wait_for_commits().unwrap();
    assert_eq!(engine.pending_writes(), 2);
    assert!(!temp_dir.path().join("db.people.json").exists());

    engine.insert_one("people", doc(2)).unwrap();
    engine.wait_for_commits().unwrap();

    assert_eq!(engine.pending_writes(), 0);
    assert!(temp_dir.path().join("db.people.json").exists());
    assert_eq!(std::fs::metadata(engine.wal_path()).unwrap().len(), 0);
}

#[test]
fn test_engine_manual_commit_without_auto_commit() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .db_path(temp_dir.path().join("db.json"))
        .auto_commit(false)
        .max_writes_before_flush(2)
        .build();
    let engine = Engine::open(config).unwrap();

    engine.insert_one("people", doc(0)).unwrap();
    engine.wait_for_commits().unwrap();
    assert_eq!(engine.pending_writes(), 0);

    assert!(!engine.commit().unwrap());
    assert!(engine.commit().unwrap());
    assert_eq!(engine.count("people", &Query::all()), 1);
    assert!(temp_dir.path().join("db.people.json").exists());
}
