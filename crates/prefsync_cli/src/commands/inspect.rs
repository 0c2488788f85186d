//! Inspect command implementation.

use prefsync_protocol::{Preference, PreferenceType};
use prefsync_store::migration::{detect_version, Migrator};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Schema version found on disk.
    pub schema_version: u32,
    /// Whether opening the store would migrate it.
    pub needs_migration: bool,
    /// One row per stored preference type.
    pub preferences: Vec<PreferenceRow>,
}

/// A single stored preference.
#[derive(Debug, Serialize)]
pub struct PreferenceRow {
    /// Preference type.
    pub pref_type: PreferenceType,
    /// Last modification time, in milliseconds since the epoch.
    pub modified_at: Option<u64>,
    /// Whether the value decodes as its typed payload.
    pub well_formed: bool,
    /// The stored value.
    pub value: Value,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads a store file without modifying it.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }

    let bytes = fs::read(path)?;
    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|e| format!("Store document is not valid JSON: {e}"))?;
    let schema_version = detect_version(&document);

    // Legacy documents are migrated in memory only.
    let (document, report) = Migrator::new().migrate(document)?;

    let mut preferences = Vec::new();
    for pref_type in PreferenceType::ALL {
        let Some(entry) = document
            .get("preferences")
            .and_then(|p| p.get(pref_type.as_str()))
        else {
            continue;
        };
        let value = entry.get("value").cloned().unwrap_or(Value::Null);
        preferences.push(PreferenceRow {
            pref_type,
            modified_at: entry.get("modified_at").and_then(Value::as_u64),
            well_formed: Preference::decode(pref_type, &value).is_some(),
            value,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        size: bytes.len() as u64,
        schema_version,
        needs_migration: report.migrated(),
        preferences,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("================");
    println!("  Size: {} bytes", result.size);
    println!("  Schema version: {}", result.schema_version);
    if result.needs_migration {
        println!("  Needs migration: yes (run `prefsync migrate`)");
    }
    println!("  Preferences: {}", result.preferences.len());

    for row in &result.preferences {
        let modified = row
            .modified_at
            .map_or_else(|| "unknown".to_string(), |ms| ms.to_string());
        let marker = if row.well_formed { "" } else { " [malformed]" };
        println!("\n  {} (modified at {}){}", row.pref_type, modified, marker);
        println!("    {}", row.value);
    }
}
