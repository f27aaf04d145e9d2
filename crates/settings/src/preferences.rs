use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use todostore_core::{Encoding, LoadOptions};
use tracing::{debug, warn};

use crate::{write_atomic, SettingsError};

const PREFERENCES_VERSION: u32 = 1;
const AUTO_ENCODING: &str = "auto";
const MIN_DEBOUNCE_MS: u64 = 10;
const MAX_DEBOUNCE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub store: StorePreferences,
    #[serde(default)]
    pub browser: BrowserPreferences,
    #[serde(default)]
    pub recent: RecentPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            store: StorePreferences::default(),
            browser: BrowserPreferences::default(),
            recent: RecentPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.store.sanitize();
        self.recent.sanitize();
    }
}

/// 待辦檔案的儲存設定。 / Settings for the backing todo file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePreferences {
    /// 空字串代表預設位置。 / Empty means the default location.
    #[serde(default)]
    pub todo_path: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub skip_blank_lines: bool,
    #[serde(default = "default_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_encoding() -> String {
    AUTO_ENCODING.to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for StorePreferences {
    fn default() -> Self {
        Self {
            todo_path: String::new(),
            encoding: default_encoding(),
            skip_blank_lines: false,
            watch_debounce_ms: default_debounce_ms(),
        }
    }
}

impl StorePreferences {
    fn sanitize(&mut self) {
        // 只有全空白才視為「使用預設位置」；路徑本身可以含空白。 /
        // Only an all-whitespace value means "default location"; real paths may contain spaces.
        if !self.todo_path.is_empty() && self.todo_path.trim().is_empty() {
            self.todo_path.clear();
        }
        if !self.encoding.eq_ignore_ascii_case(AUTO_ENCODING)
            && Encoding::from_name(&self.encoding).is_none()
        {
            warn!(encoding = %self.encoding, "unknown encoding in preferences, using auto");
            self.encoding = default_encoding();
        }
        self.watch_debounce_ms = self
            .watch_debounce_ms
            .clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
    }

    /// 轉為讀取選項；`auto` 代表自動偵測。 / Read options for the store; `auto` means detection.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            encoding: Encoding::from_name(&self.encoding),
            skip_blank_lines: self.skip_blank_lines,
        }
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserPreferences {
    /// 只列出 `.txt` 檔與資料夾。 / Only list `.txt` files and directories.
    #[serde(default = "default_true")]
    pub text_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BrowserPreferences {
    fn default() -> Self {
        Self { text_only: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPreferences {
    #[serde(default = "default_recent_capacity")]
    pub capacity: usize,
}

fn default_recent_capacity() -> usize {
    10
}

impl Default for RecentPreferences {
    fn default() -> Self {
        Self {
            capacity: default_recent_capacity(),
        }
    }
}

impl RecentPreferences {
    fn sanitize(&mut self) {
        self.capacity = self.capacity.clamp(1, 100);
    }
}

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!(path = %path.display(), "no preferences file, using defaults");
            let mut data = Preferences::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: Preferences =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), SettingsError>
    where
        F: FnMut(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            SettingsError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, payload.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
