pub mod preferences;
pub mod recent;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use todostore_core::APP_DIR_NAME;

pub use preferences::{
    BrowserPreferences, Preferences, PreferencesStore, RecentPreferences, StorePreferences,
};
pub use recent::{RecentFiles, RecentFilesStore};

pub const PREFERENCES_FILE: &str = "preferences.json";
pub const RECENT_FILE: &str = "recent.json";

/// 設定檔讀寫錯誤。 / Errors while reading or writing settings files.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 設定資料夾（`<config_dir>/todostore`）。 / Settings directory, `<config_dir>/todostore`.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data).map_err(|source| SettingsError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
