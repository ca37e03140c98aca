//! Snapshot files
//!
//! Reads and writes the registry file, the per-collection row files, and the
//! manifest listing which collection files belong to this store.
//!
//! Only collections named in the manifest are ever loaded or removed, so
//! other files in the data directory (including another store's files with a
//! dotted basename such as `{basename}.x.json`) are never touched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::document::Row;
use crate::error::{FolioError, Result};
use crate::registry::Registry;

const COLLECTION_SUFFIX: &str = ".json";
const MANIFEST_SUFFIX: &str = ".manifest";
const TMP_SUFFIX: &str = ".tmp";

/// Everything loaded from disk on startup
#[derive(Debug, Default)]
pub struct Snapshot {
    pub collections: HashMap<String, Vec<Row>>,
    pub registry: Registry,
}

/// Owns the snapshot files of one database
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    registry_path: PathBuf,
    manifest_path: PathBuf,
    basename: String,
}

impl SnapshotStore {
    /// Create the store, creating the data directory if needed
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.data_dir().to_path_buf();
        fs::create_dir_all(&dir)?;

        let basename = config.basename();
        Ok(Self {
            manifest_path: dir.join(format!("{}{}", basename, MANIFEST_SUFFIX)),
            dir,
            registry_path: config.db_path.clone(),
            basename,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// `{dir}/{basename}.manifest`
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// `{dir}/{basename}.{collection}.json`
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", self.basename, collection, COLLECTION_SUFFIX))
    }

    /// Collections recorded by the last successful `write_all`
    pub fn collection_names(&self) -> Result<BTreeSet<String>> {
        match read_optional(&self.manifest_path)? {
            Some(bytes) if !is_blank(&bytes) => parse(&self.manifest_path, &bytes),
            _ => Ok(BTreeSet::new()),
        }
    }

    /// Load the registry and every collection listed in the manifest
    pub fn load(&self) -> Result<Snapshot> {
        let registry = match read_optional(&self.registry_path)? {
            Some(bytes) if !is_blank(&bytes) => parse(&self.registry_path, &bytes)?,
            _ => Registry::new(),
        };

        let mut collections = HashMap::new();
        for name in self.collection_names()? {
            let path = self.collection_path(&name);
            let rows: Vec<Row> = match read_optional(&path)? {
                Some(bytes) if !is_blank(&bytes) => parse(&path, &bytes)?,
                Some(_) => Vec::new(),
                None => {
                    tracing::warn!(collection = %name, path = %path.display(), "Snapshot file listed in manifest is missing");
                    Vec::new()
                }
            };
            tracing::debug!(collection = %name, rows = rows.len(), "Loaded snapshot");
            collections.insert(name, rows);
        }

        Ok(Snapshot {
            collections,
            registry,
        })
    }

    /// Atomically replace one collection's file
    pub fn write_collection(&self, collection: &str, rows: &[Row]) -> Result<()> {
        let bytes = serde_json::to_vec(rows)?;
        write_atomic(&self.collection_path(collection), &bytes)
    }

    /// Atomically replace the registry file
    pub fn write_registry(&self, registry: &Registry) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(registry)?;
        write_atomic(&self.registry_path, &bytes)
    }

    /// Persist the complete state: every collection, the registry, the
    /// manifest, and the removal of files whose collection no longer exists.
    /// Returns at the first failure.
    ///
    /// The manifest is replaced only after every collection file it names
    /// is in place; files are removed only once the new manifest no longer
    /// lists them, and only if the previous manifest did.
    pub fn write_all(
        &self,
        collections: &BTreeMap<String, Vec<Row>>,
        registry: &Registry,
    ) -> Result<()> {
        let previous = self.collection_names()?;

        for (name, rows) in collections {
            self.write_collection(name, rows)?;
        }
        self.write_registry(registry)?;

        let names: BTreeSet<&String> = collections.keys().collect();
        write_atomic(&self.manifest_path, &serde_json::to_vec(&names)?)?;

        for name in previous.iter().filter(|name| !collections.contains_key(*name)) {
            tracing::debug!(collection = %name, "Removing snapshot of deleted collection");
            match fs::remove_file(self.collection_path(name)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }

        sync_dir(&self.dir)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Write to `{path}.tmp`, fsync, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| FolioError::Storage(format!("{}: {}", path.display(), e)))
}
