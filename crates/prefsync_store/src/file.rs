//! File-based preference store.

use crate::backend::{PreferenceStore, StoredPreference};
use crate::error::StoreResult;
use crate::migration::{MigrationReport, Migrator, CURRENT_SCHEMA_VERSION};
use parking_lot::RwLock;
use prefsync_protocol::{PreferenceType, Timestamp};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A preference store backed by one JSON document on disk.
///
/// The document is read once on open (migrating older schemas) and kept in
/// memory; every write rewrites it through a temporary file and a rename, so
/// a crash mid-write leaves the previous document intact.
///
/// # Degradation
///
/// A missing file opens as an empty store. A file that is not valid JSON,
/// has an unsupported schema version, or fails migration also opens empty
/// (logged at `warn`); individual malformed entries are skipped.
///
/// # Example
///
/// ```no_run
/// use prefsync_protocol::{PreferenceType, Timestamp};
/// use prefsync_store::{FileStore, PreferenceStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("preferences.json")).unwrap();
/// store
///     .save(PreferenceType::Favorites, json!({ "items": ["v1"] }), Timestamp::now())
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<PreferenceType, StoredPreference>>,
    report: MigrationReport,
}

impl FileStore {
    /// Opens the store at `path`, creating it on first write.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures other than a missing file, or
    /// if a migrated document cannot be written back.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let unmigrated = MigrationReport {
            from_version: CURRENT_SCHEMA_VERSION,
            to_version: CURRENT_SCHEMA_VERSION,
            applied: Vec::new(),
        };

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::with_entries(path, BTreeMap::new(), unmigrated));
            }
            Err(e) => return Err(e.into()),
        };

        let document: Value = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "store document is not valid JSON");
                return Ok(Self::with_entries(path, BTreeMap::new(), unmigrated));
            }
        };

        let (document, report) = match Migrator::new().migrate(document) {
            Ok(migrated) => migrated,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "store document could not be migrated");
                return Ok(Self::with_entries(path, BTreeMap::new(), unmigrated));
            }
        };

        let store = Self::with_entries(path, parse_entries(&document), report);
        if store.report.migrated() {
            store.persist()?;
        }
        Ok(store)
    }

    /// Opens the store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    fn with_entries(
        path: &Path,
        entries: BTreeMap<PreferenceType, StoredPreference>,
        report: MigrationReport,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            report,
        }
    }

    /// Returns the path to the store document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns what migration ran when the store was opened.
    #[must_use]
    pub fn migration_report(&self) -> &MigrationReport {
        &self.report
    }

    fn persist(&self) -> StoreResult<()> {
        let document = {
            let entries = self.entries.read();
            let mut preferences = Map::new();
            for (pref_type, stored) in entries.iter() {
                preferences.insert(pref_type.as_str().to_string(), serde_json::to_value(stored)?);
            }
            json!({ "schema_version": CURRENT_SCHEMA_VERSION, "preferences": preferences })
        };

        let bytes = serde_json::to_vec_pretty(&document)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn parse_entries(document: &Value) -> BTreeMap<PreferenceType, StoredPreference> {
    let mut entries = BTreeMap::new();
    let Some(preferences) = document.get("preferences").and_then(Value::as_object) else {
        return entries;
    };

    for (key, raw) in preferences {
        let Ok(pref_type) = key.parse::<PreferenceType>() else {
            tracing::warn!(key = %key, "skipping unknown preference type in store");
            continue;
        };
        match serde_json::from_value::<StoredPreference>(raw.clone()) {
            Ok(stored) => {
                entries.insert(pref_type, stored);
            }
            Err(e) => {
                tracing::warn!(%pref_type, error = %e, "skipping malformed store entry");
            }
        }
    }
    entries
}

impl PreferenceStore for FileStore {
    fn load(&self, pref_type: PreferenceType) -> Option<StoredPreference> {
        self.entries.read().get(&pref_type).cloned()
    }

    fn save(
        &self,
        pref_type: PreferenceType,
        value: Value,
        modified_at: Timestamp,
    ) -> StoreResult<()> {
        self.entries
            .write()
            .insert(pref_type, StoredPreference::new(value, modified_at));
        self.persist()
    }

    fn remove(&self, pref_type: PreferenceType) -> StoreResult<()> {
        let removed = self.entries.write().remove(&pref_type).is_some();
        if removed {
            self.persist()?;
        }
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entries.write().clear();
        self.persist()
    }
}
