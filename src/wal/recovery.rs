//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::path::Path;

use crate::error::Result;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// A line that could not be replayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// 1-based line number in the WAL file
    pub line: usize,

    /// Why the line was skipped
    pub reason: String,
}

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries decoded and applied
    pub entries_recovered: u64,

    /// Number of lines skipped (undecodable or failed to apply)
    pub entries_corrupted: u64,

    /// Details for every skipped line, in file order
    pub skipped: Vec<SkippedEntry>,
}

impl RecoveryResult {
    pub fn is_clean(&self) -> bool {
        self.entries_corrupted == 0
    }
}

impl WalRecovery {
    /// Replay a WAL file through `apply`.
    ///
    /// This will:
    /// 1. Treat a missing file as an empty log
    /// 2. Decode the log line by line
    /// 3. Skip (and report) lines that do not decode or fail to apply,
    ///    continuing with the rest
    /// 4. Propagate only I/O failures
    pub fn replay<F>(path: &Path, mut apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let mut result = RecoveryResult::default();

        let reader = match WalReader::open(path)? {
            Some(reader) => reader,
            None => return Ok(result),
        };

        for item in reader.entries() {
            let (line, decoded) = item?;
            let outcome = decoded.and_then(&mut apply);

            match outcome {
                Ok(()) => result.entries_recovered += 1,
                Err(e) => {
                    tracing::warn!(line, error = %e, "Skipping WAL entry during replay");
                    result.entries_corrupted += 1;
                    result.skipped.push(SkippedEntry {
                        line,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// Decode every entry of a WAL file without applying anything
    pub fn read_all(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::replay(path, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok((entries, result))
    }
}
