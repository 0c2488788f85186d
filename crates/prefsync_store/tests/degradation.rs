//! Property tests: whatever is on disk, opening the store never fails.

use prefsync_protocol::PreferenceType;
use prefsync_store::{FileStore, PreferenceStore};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn arbitrary_bytes_open_without_error(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, &bytes).unwrap();

        let store = FileStore::open(&path).unwrap();
        for pref_type in PreferenceType::ALL {
            // Reads never fail; typed reads of junk are simply absent.
            let _ = store.load_typed(pref_type);
        }
    }

    #[test]
    fn arbitrary_entry_values_never_break_open(
        favorites in "[ -~]{0,32}",
        modified_at in any::<i64>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let document = json!({
            "schema_version": 2,
            "preferences": {
                "favorites": { "value": favorites, "modified_at": modified_at }
            }
        });
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let store = FileStore::open(&path).unwrap();
        prop_assert!(store.load_typed(PreferenceType::Favorites).is_none());
        prop_assert_eq!(store.load(PreferenceType::Favorites).is_some(), modified_at >= 0);
    }
}
