//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a missing or empty WAL
//! - Entries are replayed in file order
//! - Partial trailing lines are skipped and reported
//! - Corrupt lines in the middle do not stop replay
//! - Apply failures are counted like corrupt lines

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use folio::config::WalSyncStrategy;
use folio::wal::{Operation, WalEntry, WalRecovery, WalWriter};
use folio::{FolioError, Query};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal.log");
    (temp_dir, wal_path)
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        let entry = WalEntry::delete("items", Query::by_id(format!("id{}", i)));
        writer.append(&entry, false).unwrap();
    }
}

fn append_raw(path: &PathBuf, text: &str) {
    let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

fn replayed_ids(path: &PathBuf) -> Vec<String> {
    let (entries, _) = WalRecovery::read_all(path).unwrap();
    entries
        .into_iter()
        .map(|entry| entry.query.unwrap().id().unwrap().to_string())
        .collect()
}

// =============================================================================
// Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_missing_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let (entries, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(result.is_clean());
}

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result, Default::default());
}

#[test]
fn test_recover_preserves_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let ids = replayed_ids(&wal_path);

    assert_eq!(ids, vec!["id0", "id1", "id2", "id3", "id4"]);
}

#[test]
fn test_recover_counts_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 12);

    let (entries, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert_eq!(entries.len(), 12);
    assert_eq!(result.entries_recovered, 12);
    assert!(entries.iter().all(|e| e.op == Operation::Delete));
}

// =============================================================================
// Partial / Corrupt Line Tests
// =============================================================================

#[test]
fn test_recover_skips_partial_trailing_line() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    append_raw(&wal_path, r#"{"op":"delete","collec"#);

    let (entries, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.entries_recovered, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.skipped[0].line, 4);
    assert!(!result.is_clean());
}

#[test]
fn test_recover_continues_past_corrupt_middle_line() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    append_raw(&wal_path, "garbage that is not json\n");
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .append(&WalEntry::delete("items", Query::by_id("late")), false)
            .unwrap();
    }

    let ids = replayed_ids(&wal_path);
    let (_, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert_eq!(ids, vec!["id0", "id1", "late"]);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.skipped[0].line, 3);
}

#[test]
fn test_recover_all_lines_corrupt() {
    let (_temp, wal_path) = setup_temp_wal();
    fs::write(&wal_path, "{\n[1,2\nnull\n").unwrap();

    let (entries, result) = WalRecovery::read_all(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_corrupted, 3);
    assert_eq!(
        result.skipped.iter().map(|s| s.line).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

// =============================================================================
// Apply Callback Tests
// =============================================================================

#[test]
fn test_replay_apply_errors_are_skipped() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    let mut applied = Vec::new();
    let result = WalRecovery::replay(&wal_path, |entry| {
        let id = entry.query.as_ref().and_then(|q| q.id()).unwrap_or("").to_string();
        if id == "id2" {
            return Err(FolioError::InvalidRecord("rejected".to_string()));
        }
        applied.push(id);
        Ok(())
    })
    .unwrap();

    assert_eq!(applied, vec!["id0", "id1", "id3"]);
    assert_eq!(result.entries_recovered, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.skipped[0].line, 3);
    assert!(result.skipped[0].reason.contains("rejected"));
}
