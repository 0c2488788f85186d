//! Migrate command implementation.

use prefsync_store::migration::Migrator;
use prefsync_store::{FileStore, MigrationReport};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Upgrades a store file to the current schema.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Migrating store at {:?}", path);

    let report = migrate(path, dry_run)?;

    println!("Store Migration");
    println!("===============");
    println!("  From version: {}", report.from_version);
    println!("  To version: {}", report.to_version);

    if !report.migrated() {
        println!("  Store is up to date.");
        return Ok(());
    }

    println!("\nMigrations:");
    for name in &report.applied {
        println!("  {}", name);
    }
    if dry_run {
        println!("\n(dry run - store file not modified)");
    }

    Ok(())
}

/// Migrates a store file, or only plans the migration when `dry_run` is set.
pub fn migrate(path: &Path, dry_run: bool) -> Result<MigrationReport, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }

    if dry_run {
        let document: Value = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| format!("Store document is not valid JSON: {e}"))?;
        let (_, report) = Migrator::new().migrate(document)?;
        return Ok(report);
    }

    // Opening the store migrates and rewrites it.
    let store = FileStore::open(path)?;
    Ok(store.migration_report().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_protocol::PreferenceType;
    use prefsync_store::PreferenceStore;
    use serde_json::json;

    fn legacy_store(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("prefs.json");
        let document = json!({
            "goals": ["read-daily"],
            "goals_updated_at": 1_700_000_000_000u64,
            "theme": { "mode": "dark", "palette": "sepia" }
        });
        fs::write(&path, document.to_string()).unwrap();
        path
    }

    #[test]
    fn dry_run_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = legacy_store(dir.path());
        let before = fs::read_to_string(&path).unwrap();

        let report = migrate(&path, true).unwrap();
        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, 2);
        assert_eq!(report.applied, vec!["wrap_preferences".to_string()]);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn migration_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = legacy_store(dir.path());

        assert!(migrate(&path, false).unwrap().migrated());
        assert!(!migrate(&path, false).unwrap().migrated());

        let store = FileStore::open(&path).unwrap();
        let goals = store.load(PreferenceType::Goals).unwrap();
        assert_eq!(goals.value, json!({ "items": ["read-daily"] }));
    }

    #[test]
    fn newer_schema_is_rejected_on_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, json!({ "schema_version": 99 }).to_string()).unwrap();
        assert!(migrate(&path, true).is_err());
    }
}
