//! Configuration for Folio
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{FolioError, Result};

/// Main configuration for a Folio instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Primary file holding the collection configuration registry.
    /// Its directory holds the snapshot files, its stem is the basename:
    ///   {dir}/
    ///     ├── {basename}.json               (configuration registry)
    ///     ├── {basename}.{collection}.json  (one row array per collection)
    ///     ├── {basename}.manifest           (names of this store's collections)
    ///     └── wal/{basename}.wal.log        (write-ahead log)
    pub db_path: PathBuf,

    /// Keep everything in memory: no WAL, no snapshot files
    pub memory_only: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Explicit WAL location (defaults to `{dir}/wal/{basename}.wal.log`)
    pub wal_path: Option<PathBuf>,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Commit Configuration
    // -------------------------------------------------------------------------
    /// Enqueue a commit after every successful mutation
    pub auto_commit: bool,

    /// Number of commits that triggers a full flush
    pub max_writes_before_flush: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./folio_data/folio.json"),
            memory_only: false,
            wal_path: None,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            auto_commit: true,
            max_writes_before_flush: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding the registry and snapshot files
    pub fn data_dir(&self) -> &Path {
        match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// File stem of the primary path, shared by every sibling file
    pub fn basename(&self) -> String {
        self.db_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "folio".to_string())
    }

    /// Effective WAL location
    pub fn resolved_wal_path(&self) -> PathBuf {
        match &self.wal_path {
            Some(path) => path.clone(),
            None => self
                .data_dir()
                .join("wal")
                .join(format!("{}.wal.log", self.basename())),
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_writes_before_flush == 0 {
            return Err(FolioError::Config(
                "max_writes_before_flush must be at least 1".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(FolioError::Config(
                "WAL sync interval must be at least 1 entry".to_string(),
            ));
        }
        if !self.memory_only && self.db_path.file_name().is_none() {
            return Err(FolioError::Config(format!(
                "db_path '{}' does not name a file",
                self.db_path.display()
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the primary registry file (its directory holds the snapshots)
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Override the WAL location
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wal_path = Some(path.into());
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Enable or disable commit-after-every-write
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.config.auto_commit = enabled;
        self
    }

    /// Set the number of commits between flushes
    pub fn max_writes_before_flush(mut self, count: usize) -> Self {
        self.config.max_writes_before_flush = count;
        self
    }

    /// Keep all state in memory only
    pub fn memory_only(mut self, enabled: bool) -> Self {
        self.config.memory_only = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
