//! # Folio
//!
//! An embedded, single-process JSON document store with:
//! - Write-Ahead Logging (WAL) before every in-memory mutation
//! - Crash recovery by WAL replay
//! - Batched commits that periodically snapshot every collection
//! - Non-blocking collection/row locks for concurrent callers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Engine (Query/Mutation API)                  │
//! │   insert/update/delete/upsert  ·  find/count/sample          │
//! └──────┬──────────────┬──────────────────┬────────────────────┘
//!        │              │                  │
//!        ▼              ▼                  ▼
//! ┌─────────────┐ ┌─────────────┐  ┌──────────────────┐
//! │ LockManager │ │     WAL     │  │  Store + Registry │
//! │ (try-lock)  │ │  (Append)   │  │    (RwLock)       │
//! └─────────────┘ └──────┬──────┘  └────────┬─────────┘
//!                        │                  │
//!                        ▼                  ▼
//!                 ┌─────────────────────────────────┐
//!                 │ CommitScheduler → Snapshot files │
//!                 │  (ordered queue)   (tmp+rename)  │
//!                 └─────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod document;
pub mod query;
pub mod store;
pub mod registry;
pub mod lock;
pub mod wal;
pub mod storage;
pub mod commit;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FolioError, Result};
pub use config::Config;
pub use document::{Document, Meta, Row};
pub use query::Query;
pub use registry::CollectionConfig;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Folio
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
