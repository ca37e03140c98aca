//! Storage Module
//!
//! Persistent snapshot layer.
//!
//! ## Responsibilities
//! - Load the registry and every collection named in the manifest on startup
//! - Write the full state on flush, one file per collection
//! - Never expose a half-written file: write a temp file, fsync, rename
//! - Remove files of collections that no longer exist, and nothing else
//!
//! ## File Layout
//! ```text
//! {dir}/
//!   ├── {basename}.json                (registry: { collection: {pk, sk} })
//!   ├── {basename}.{collection}.json   (row array)
//!   ├── {basename}.manifest            (JSON array of collection names)
//!   └── ...
//! ```

mod snapshot;

pub use snapshot::{Snapshot, SnapshotStore};
