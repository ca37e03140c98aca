//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::WalEntry;

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: File,
    sync_strategy: WalSyncStrategy,

    /// Entries written since the last fsync
    unsynced: usize,

    /// Entries written since open or the last truncate
    entries: u64,

    /// Length of the file up to the end of its last complete line
    len: u64,

    /// The file may end in a partial line, so the next append must start
    /// on a fresh one
    torn: bool,
}

impl WalWriter {
    /// Open or create a WAL file (and its directory)
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let torn = len > 0 && !ends_with_newline(path)?;
        if torn {
            tracing::warn!(path = %path.display(), "WAL ends in a partial line");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            sync_strategy,
            unsynced: 0,
            entries: 0,
            len,
            torn,
        })
    }

    /// Append an entry as one newline-terminated line.
    ///
    /// With `skip` set nothing is written: replay uses it so that entries
    /// already in the log are not logged twice.
    pub fn append(&mut self, entry: &WalEntry, skip: bool) -> Result<()> {
        if skip {
            return Ok(());
        }

        let mut line = String::new();
        if self.torn {
            line.push('\n');
        }
        line.push_str(&entry.serialize()?);
        line.push('\n');

        // Single write call so a crash leaves at most one partial line
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            // Cut off whatever part of the line made it out
            if self.file.set_len(self.len).is_err() {
                self.torn = true;
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        self.torn = false;
        self.entries += 1;
        self.unsynced += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if should_sync {
            self.sync()?;
        }

        Ok(())
    }

    /// Empty the log. Only call once every logged operation is durable in
    /// the snapshot files.
    pub fn truncate(&mut self, skip: bool) -> Result<()> {
        if skip {
            return Ok(());
        }

        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.torn = false;
        self.entries = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Entries appended since open or the last truncate
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Current size of the log file in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
