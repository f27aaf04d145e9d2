use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use todostore_core::{Encoding, LegacyEncoding};
use todostore_settings::{Preferences, PreferencesStore, SettingsError};

#[test]
fn load_missing_file_returns_defaults() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("preferences.json");

    let store = PreferencesStore::load(&path).expect("load defaults");
    let prefs = store.preferences();
    assert!(prefs.store.todo_path.is_empty());
    assert_eq!(prefs.store.encoding, "auto");
    assert_eq!(prefs.store.watch_debounce(), Duration::from_millis(100));
    assert!(prefs.browser.text_only);
    assert_eq!(prefs.recent.capacity, 10);
    assert!(!path.exists());
}

#[test]
fn update_persists_and_reloads() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("preferences.json");

    let mut store = PreferencesStore::new(path.clone(), Preferences::default());
    store
        .update(|prefs| {
            prefs.store.todo_path = "/lists/work.txt".to_string();
            prefs.store.encoding = "gbk".to_string();
            prefs.store.skip_blank_lines = true;
            prefs.browser.text_only = false;
        })
        .expect("save");

    let reloaded = PreferencesStore::load(&path).expect("reload");
    let prefs = reloaded.preferences();
    assert_eq!(prefs.store.todo_path, "/lists/work.txt");
    assert!(!prefs.browser.text_only);

    let options = prefs.store.load_options();
    assert_eq!(options.encoding, Some(Encoding::Legacy(LegacyEncoding::Gbk)));
    assert!(options.skip_blank_lines);
}

#[test]
fn out_of_range_values_are_sanitized() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("preferences.json");

    let mut store = PreferencesStore::load(&path).expect("defaults");
    store
        .update(|prefs| {
            prefs.store.todo_path = " \t\n".to_string();
            prefs.store.encoding = "ebcdic".to_string();
            prefs.store.watch_debounce_ms = 0;
            prefs.recent.capacity = 0;
        })
        .expect("update");

    let prefs = store.preferences();
    assert!(prefs.store.todo_path.is_empty());
    assert_eq!(prefs.store.encoding, "auto");
    assert_eq!(prefs.store.load_options().encoding, None);
    assert_eq!(prefs.store.watch_debounce_ms, 10);
    assert_eq!(prefs.recent.capacity, 1);
}

#[test]
fn legacy_file_without_sections_is_upgraded() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("preferences.json");
    fs::write(&path, r#"{ "version": 0 }"#).expect("seed legacy file");

    let store = PreferencesStore::load(&path).expect("load legacy");
    assert_eq!(store.preferences().version, 1);
    assert_eq!(store.preferences().store.watch_debounce_ms, 100);
    assert!(store.preferences().browser.text_only);
}

#[test]
fn malformed_json_reports_parse_error() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("preferences.json");
    fs::write(&path, "{ store: ").expect("seed broken file");

    let err = PreferencesStore::load(&path).expect_err("should fail");
    assert!(matches!(err, SettingsError::Parse { .. }));
}

#[test]
fn paths_with_surrounding_spaces_are_kept_verbatim() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("preferences.json");

    let mut store = PreferencesStore::load(&path).expect("defaults");
    store
        .update(|prefs| prefs.store.todo_path = " /lists/odd name.txt ".to_string())
        .expect("update");

    let reloaded = PreferencesStore::load(&path).expect("reload");
    assert_eq!(reloaded.preferences().store.todo_path, " /lists/odd name.txt ");
}
