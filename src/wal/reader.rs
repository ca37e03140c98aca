//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::{FolioError, Result};

use super::WalEntry;

/// Reads entries from the WAL file, one line at a time
pub struct WalReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl WalReader {
    /// Open a WAL file for reading.
    ///
    /// A missing file is not an error: it yields `Ok(None)`. Any other open
    /// failure propagates.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        }))
    }

    /// Read the next entry from the WAL.
    ///
    /// Returns `Ok(None)` at end of file. An I/O failure is returned as the
    /// outer error; a line that does not decode is returned as
    /// `Some((line, Err(CorruptWalEntry)))` so the caller can skip it and
    /// keep going. Blank lines are ignored.
    pub fn next_entry(&mut self) -> Result<Option<(usize, Result<WalEntry>)>> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line,
                None => return Ok(None),
            };
            self.line_no += 1;

            let decoded = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => decode_line(self.line_no, &line),
                // Invalid UTF-8 from a torn write is a bad line, not an I/O failure
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    Err(FolioError::CorruptWalEntry {
                        line: self.line_no,
                        reason: e.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            };
            return Ok(Some((self.line_no, decoded)));
        }
    }

    /// Iterate over all lines as (line number, decoded entry)
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            failed: false,
        }
    }
}

fn decode_line(line_no: usize, line: &str) -> Result<WalEntry> {
    WalEntry::deserialize(line).map_err(|e| FolioError::CorruptWalEntry {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Iterator over WAL entries.
///
/// Items are `Ok((line, entry_result))`; an `Err` item means reading the
/// file itself failed, after which the iterator is exhausted.
pub struct WalIterator {
    reader: WalReader,
    failed: bool,
}

impl Iterator for WalIterator {
    type Item = Result<(usize, Result<WalEntry>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
