//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append an entry before the matching in-memory mutation
//! - Truncate only after the snapshot files hold every logged operation
//! - Replay on startup, skipping lines that do not decode
//!
//! ## File Format
//! Newline-delimited JSON, one entry per line:
//! ```text
//! {"op":"insert","collection":"people","data":{"record":{...},"_meta":{...}}}
//! {"op":"update","collection":"people","data":{...},"query":{"name":"Ann"}}
//! {"op":"delete","collection":"people","query":{"_id":"..."}}
//! ```
//! A crash mid-append leaves at most one partial trailing line, which replay
//! reports and skips.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{Operation, WalEntry};
pub use writer::WalWriter;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, SkippedEntry, WalRecovery};
