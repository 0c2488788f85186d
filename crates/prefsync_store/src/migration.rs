//! Store document schema migrations.
//!
//! The file store persists one JSON document. Its layout is versioned by a
//! top-level `schema_version` field; documents without one predate
//! versioning and are treated as version 1.
//!
//! ## Layouts
//!
//! Version 1 stored each type's value directly, with list-valued types as
//! bare arrays and an optional sibling `<type>_updated_at` field:
//!
//! ```text
//! { "favorites": ["v1"], "favorites_updated_at": 1700000000000,
//!   "theme": { "mode": "dark", "palette": "sepia" } }
//! ```
//!
//! Version 2 wraps everything in a `preferences` map of timestamped entries:
//!
//! ```text
//! { "schema_version": 2,
//!   "preferences": { "favorites": { "value": { "items": ["v1"] },
//!                                   "modified_at": 1700000000000 } } }
//! ```
//!
//! Migrations are forward-only and run in version order.

use crate::error::{StoreError, StoreResult};
use prefsync_protocol::PreferenceType;
use serde_json::{json, Map, Value};

/// The schema version this build writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// A single forward migration step.
pub trait Migration: Send + Sync {
    /// The schema version this migration produces.
    fn version(&self) -> u32;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Rewrites the document in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be upgraded.
    fn up(&self, document: &mut Value) -> StoreResult<()>;
}

/// Result of migrating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Schema version found in the document.
    pub from_version: u32,
    /// Schema version after migration.
    pub to_version: u32,
    /// Names of the migrations that ran, in order.
    pub applied: Vec<String>,
}

impl MigrationReport {
    /// Returns true if any migration ran.
    pub fn migrated(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Returns the schema version of a document.
pub fn detect_version(document: &Value) -> u32 {
    document
        .get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1)
}

/// Runs registered migrations in version order.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Creates a migrator with no migrations registered.
    pub fn empty() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Creates a migrator with every built-in migration.
    pub fn new() -> Self {
        let mut migrator = Self::empty();
        migrator.register(Box::new(WrapPreferences));
        migrator
    }

    /// Registers a migration.
    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.version());
    }

    /// Upgrades a document to the latest registered version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedVersion`] for documents newer than
    /// [`CURRENT_SCHEMA_VERSION`], or the error of a failing migration.
    pub fn migrate(&self, mut document: Value) -> StoreResult<(Value, MigrationReport)> {
        let from_version = detect_version(&document);
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion(from_version));
        }

        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        };

        for migration in &self.migrations {
            if migration.version() <= report.to_version {
                continue;
            }
            migration.up(&mut document)?;
            if let Some(obj) = document.as_object_mut() {
                obj.insert("schema_version".into(), json!(migration.version()));
            }
            tracing::info!(
                migration = migration.name(),
                version = migration.version(),
                "applied store migration"
            );
            report.to_version = migration.version();
            report.applied.push(migration.name().to_string());
        }

        Ok((document, report))
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Version 1 → 2: wraps flat values in timestamped entries.
struct WrapPreferences;

impl Migration for WrapPreferences {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "wrap_preferences"
    }

    fn up(&self, document: &mut Value) -> StoreResult<()> {
        let legacy = document.as_object().ok_or_else(|| StoreError::Migration {
            version: 2,
            reason: "document is not an object".into(),
        })?;

        let mut preferences = Map::new();
        for pref_type in PreferenceType::ALL {
            let Some(value) = legacy.get(pref_type.as_str()) else {
                continue;
            };
            let value = match (pref_type, value) {
                (PreferenceType::Favorites | PreferenceType::Goals, Value::Array(items)) => {
                    json!({ "items": items })
                }
                (_, other) => other.clone(),
            };
            let modified_at = legacy
                .get(&format!("{}_updated_at", pref_type.as_str()))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            preferences.insert(
                pref_type.as_str().to_string(),
                json!({ "value": value, "modified_at": modified_at }),
            );
        }

        *document = json!({ "preferences": preferences });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unversioned_document_is_version_one() {
        assert_eq!(detect_version(&json!({ "favorites": [] })), 1);
        assert_eq!(detect_version(&json!({ "schema_version": 2 })), 2);
    }

    #[test]
    fn migrate_v1_wraps_values() {
        let legacy = json!({
            "favorites": ["v1", "v2"],
            "favorites_updated_at": 1_700_000_000_000u64,
            "theme": { "mode": "dark", "palette": "sepia" },
            "unrelated": true
        });

        let (migrated, report) = Migrator::new().migrate(legacy).unwrap();
        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, 2);
        assert_eq!(report.applied, vec!["wrap_preferences".to_string()]);

        assert_eq!(migrated["schema_version"], json!(2));
        assert_eq!(
            migrated["preferences"]["favorites"],
            json!({ "value": { "items": ["v1", "v2"] }, "modified_at": 1_700_000_000_000u64 })
        );
        assert_eq!(
            migrated["preferences"]["theme"]["modified_at"],
            json!(0)
        );
        assert!(migrated.get("unrelated").is_none());
    }

    #[test]
    fn current_document_is_untouched() {
        let doc = json!({ "schema_version": 2, "preferences": {} });
        let (migrated, report) = Migrator::new().migrate(doc.clone()).unwrap();
        assert!(!report.migrated());
        assert_eq!(migrated, doc);
    }

    #[test]
    fn newer_document_is_rejected() {
        let doc = json!({ "schema_version": 9, "preferences": {} });
        assert!(matches!(
            Migrator::new().migrate(doc),
            Err(StoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn non_object_legacy_document_fails() {
        let result = Migrator::new().migrate(json!(["favorites"]));
        assert!(matches!(result, Err(StoreError::Migration { version: 2, .. })));
    }
}
