use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::listeners::{
    DirectorySelectedListener, FileSelectedListener, ListenerId, ListenerList,
};

/// 代表上一層資料夾的合成項目。 / Synthetic entry standing for the parent directory.
pub const PARENT_DIR: &str = "..";

const TEXT_SUFFIX: &str = ".txt";

/// 瀏覽器操作錯誤。 / Errors raised by browser navigation.
#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("{} no longer exists", .0.display())]
    NotFound(PathBuf),
    #[error("'{0}' is not in the current listing")]
    UnknownEntry(String),
    #[error("failed to inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("browse session already finished")]
    SessionClosed,
}

/// `select` 的結果。 / Outcome of a `select` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 進入資料夾，瀏覽繼續。 / Entered a directory; the session continues.
    Navigated(PathBuf),
    /// 選定檔案，瀏覽結束。 / Chose a file; the session is over.
    FileChosen(PathBuf),
}

/// 起始路徑無效時的預設根目錄。 / Root used when the starting path is not a directory.
pub fn browse_root() -> PathBuf {
    dirs::home_dir()
        .filter(|home| home.is_dir())
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// 互動式資料夾瀏覽狀態機；呈現方式交給呼叫端。 /
/// Interactive directory navigation state; rendering is left to the caller.
///
/// The caller shows [`entries`](Self::entries), feeds the user's pick back through
/// [`select`](Self::select), and repeats until a file is chosen.
#[derive(Debug)]
pub struct DirectoryBrowser {
    current: PathBuf,
    entries: Vec<String>,
    text_only: bool,
    finished: bool,
    file_listeners: ListenerList<dyn FileSelectedListener>,
    dir_listeners: ListenerList<dyn DirectorySelectedListener>,
}

impl DirectoryBrowser {
    /// 從 `start` 開始瀏覽；無效時改用 [`browse_root`]。 / Starts at `start`, falling back to [`browse_root`].
    pub fn new(start: impl AsRef<Path>, text_only: bool) -> Self {
        Self::with_root(start, text_only, browse_root())
    }

    /// 同 [`new`](Self::new)，但可指定備用根目錄。 / Like [`new`](Self::new) with an explicit fallback root.
    pub fn with_root(start: impl AsRef<Path>, text_only: bool, root: impl AsRef<Path>) -> Self {
        let start = start.as_ref();
        let dir = if start.is_dir() {
            start
        } else {
            debug!(start = %start.display(), "start is not a directory, using browse root");
            root.as_ref()
        };
        let current = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let entries = list_dir(&current, text_only);
        Self {
            current,
            entries,
            text_only,
            finished: false,
            file_listeners: ListenerList::new(),
            dir_listeners: ListenerList::new(),
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current
    }

    /// 目前顯示的項目（已篩選排序）。 / Entries currently on display, filtered and sorted.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn text_only(&self) -> bool {
        self.text_only
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 列出 `path` 底下符合篩選的項目。 / Lists the children of `path` that pass this browser's filter.
    ///
    /// 名稱遞增排序；有上層時 `..` 固定放在最前面。無法讀取的項目直接略過，
    /// 無法讀取的資料夾視為沒有子項目。 /
    /// Names sort ascending with `..` first whenever `path` has a parent. Unreadable
    /// entries are skipped and an unreadable directory lists no children.
    pub fn list_entries(&self, path: &Path) -> Vec<String> {
        list_dir(path, self.text_only)
    }

    /// 重新讀取目前資料夾。 / Re-lists the current directory.
    pub fn refresh(&mut self) {
        self.entries = list_dir(&self.current, self.text_only);
    }

    pub fn add_file_listener(&mut self, listener: impl FileSelectedListener + 'static) -> ListenerId {
        self.file_listeners.add(Box::new(listener))
    }

    pub fn add_directory_listener(
        &mut self,
        listener: impl DirectorySelectedListener + 'static,
    ) -> ListenerId {
        self.dir_listeners.add(Box::new(listener))
    }

    /// 選取目前清單中的項目。 / Selects an entry from the current listing.
    ///
    /// 資料夾會進入並重新列出；檔案會結束瀏覽並依序通知所有檔案監聽者。 /
    /// A directory is entered and re-listed. A file ends the session and notifies
    /// every file listener, in registration order, with its absolute path.
    pub fn select(&mut self, name: &str) -> Result<Selection, BrowseError> {
        if self.finished {
            return Err(BrowseError::SessionClosed);
        }
        if !self.entries.iter().any(|entry| entry == name) {
            return Err(BrowseError::UnknownEntry(name.to_string()));
        }

        let target = if name == PARENT_DIR {
            self.current
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| BrowseError::NotFound(self.current.clone()))?
        } else {
            self.current.join(name)
        };

        let metadata = fs::metadata(&target).map_err(|source| match source.kind() {
            ErrorKind::NotFound => BrowseError::NotFound(target.clone()),
            _ => BrowseError::Io {
                path: target.clone(),
                source,
            },
        })?;

        if metadata.is_dir() {
            self.entries = list_dir(&target, self.text_only);
            self.current = target.clone();
            debug!(dir = %self.current.display(), entries = self.entries.len(), "navigated");
            return Ok(Selection::Navigated(target));
        }

        self.finished = true;
        let notified = self.file_listeners.fire(|listener| listener.file_selected(&target));
        debug!(file = %target.display(), notified, "file chosen");
        Ok(Selection::FileChosen(target))
    }

    /// 以目前資料夾結束瀏覽並通知資料夾監聽者。 / Ends the session on the current directory, notifying directory listeners.
    pub fn choose_current_directory(&mut self) -> Result<PathBuf, BrowseError> {
        if self.finished {
            return Err(BrowseError::SessionClosed);
        }
        if !self.current.is_dir() {
            return Err(BrowseError::NotFound(self.current.clone()));
        }

        self.finished = true;
        let dir = self.current.clone();
        self.dir_listeners
            .fire(|listener| listener.directory_selected(&dir));
        Ok(dir)
    }
}

fn list_dir(path: &Path, text_only: bool) -> Vec<String> {
    let mut names = Vec::new();
    match fs::read_dir(path) {
        Ok(children) => {
            for child in children.flatten() {
                let Ok(name) = child.file_name().into_string() else {
                    continue;
                };
                if accepts(&child.path(), &name, text_only) {
                    names.push(name);
                }
            }
        }
        Err(err) => debug!(dir = %path.display(), error = %err, "directory not listable"),
    }

    names.sort();
    if path.parent().is_some() {
        names.insert(0, PARENT_DIR.to_string());
    }
    names
}

fn accepts(path: &Path, name: &str, text_only: bool) -> bool {
    // 跟隨符號連結；斷掉的連結會在這裡被排除。 / Follows symlinks, so dangling links drop out here.
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };

    let readable = if metadata.is_dir() {
        fs::read_dir(path).is_ok()
    } else if metadata.is_file() {
        File::open(path).is_ok()
    } else {
        // FIFO、socket、裝置檔不列出，開啟 FIFO 會阻塞。 / FIFOs, sockets and devices are skipped; opening a FIFO blocks.
        false
    };

    readable
        && (!text_only || metadata.is_dir() || name.to_lowercase().ends_with(TEXT_SUFFIX))
}
