use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{write_atomic, SettingsError};

/// 最近使用過的待辦檔案，最新的在前。 / Todo files used recently, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentFiles {
    capacity: usize,
    entries: VecDeque<PathBuf>,
}

impl RecentFiles {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// 依保存的順序還原，超出容量的舊項目捨棄。 / Restores persisted entries, dropping the oldest beyond capacity.
    pub fn with_entries(capacity: usize, entries: Vec<PathBuf>) -> Self {
        let mut recent = Self::new(capacity);
        recent.entries = entries.into_iter().take(recent.capacity).collect();
        recent
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.entries.truncate(self.capacity);
    }

    /// 加入或提升至最前面。 / Inserts or promotes a path to the front.
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.entries.retain(|existing| existing != &path);
        self.entries.push_front(path);
        self.entries.truncate(self.capacity);
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|existing| existing.as_path() != path);
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct RecentFilesFile {
    capacity: usize,
    #[serde(default)]
    entries: Vec<PathBuf>,
}

/// 將最近檔案清單保存為 JSON。 / Persists the recent-files list as JSON.
#[derive(Debug)]
pub struct RecentFilesStore {
    path: PathBuf,
    history: RecentFiles,
}

impl RecentFilesStore {
    /// 載入清單；檔案不存在時回傳空清單。 / Loads the list, or an empty one when the file is missing.
    pub fn load(path: impl AsRef<Path>, default_capacity: usize) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                history: RecentFiles::new(default_capacity),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let file: RecentFilesFile =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            history: RecentFiles::with_entries(file.capacity, file.entries),
        })
    }

    pub fn history(&self) -> &RecentFiles {
        &self.history
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.history.iter()
    }

    /// 新增或提升項目並立即寫回。 / Adds or promotes an entry and persists it.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> Result<(), SettingsError> {
        self.history.add(path);
        self.persist()
    }

    pub fn remove(&mut self, path: &Path) -> Result<bool, SettingsError> {
        let removed = self.history.remove(path);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), SettingsError> {
        if capacity.max(1) == self.history.capacity() {
            return Ok(());
        }
        self.history.set_capacity(capacity);
        self.persist()
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let file = RecentFilesFile {
            capacity: self.history.capacity(),
            entries: self.history.iter().cloned().collect(),
        };
        let payload =
            serde_json::to_string_pretty(&file).map_err(|source| SettingsError::Serialize {
                path: self.path.clone(),
                source,
            })?;
        write_atomic(&self.path, payload.as_bytes())
    }
}
