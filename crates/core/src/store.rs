use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::DirectoryBrowser;
use crate::file_monitor::{ChangeCallback, FileMonitor, FileMonitorError};
use crate::text::{self, LoadOptions, TextError, TextFormat};

/// 應用程式資料夾名稱。 / Directory name under the user's data directory.
pub const APP_DIR_NAME: &str = "todostore";
pub const DEFAULT_FILE_NAME: &str = "todo.txt";
pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

/// 未指定路徑時使用的待辦檔案位置。 / Todo file used when no path is configured.
pub fn default_todo_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(DEFAULT_FILE_NAME)
}

/// 儲存層的 I/O 錯誤。 / Storage I/O errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: TextError,
    },
    #[error("failed to encode contents for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: TextError,
    },
    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: FileMonitorError,
    },
}

/// 待辦清單儲存後端的共同介面。 / Capabilities shared by todo-list storage backends.
///
/// 本機實作見 [`LocalFileStore`]；遠端後端實作相同介面即可替換。 /
/// [`LocalFileStore`] is the local implementation; a remote backend implements the
/// same trait so callers do not change.
pub trait FileStore {
    fn is_authenticated(&self) -> bool;
    fn supports_authentication(&self) -> bool;
    fn is_local(&self) -> bool;
    fn deauthenticate(&mut self);
    fn start_login(&mut self);

    /// 讀取整個檔案並切成行；失敗時清空記憶體緩衝。 / Reads the whole file as lines. On failure the in-memory buffer is cleared.
    fn get(&mut self, options: &LoadOptions) -> Result<Vec<String>, StoreError>;

    /// 覆寫整個檔案。 / Replaces the file contents.
    fn store(&mut self, content: &str) -> Result<(), StoreError>;

    /// 附加至檔案結尾，不先讀取。 / Appends to the end of the file without reading it.
    fn append(&mut self, content: &str) -> Result<(), StoreError>;

    /// 開始監看外部變更；已在監看時回傳 `Ok(false)` 且不註冊新的回呼。 /
    /// Starts watching for external changes. Returns `Ok(false)` without registering
    /// anything when a watch is already active.
    fn start_watching(&mut self, on_change: ChangeCallback) -> Result<bool, StoreError>;

    fn stop_watching(&mut self);

    /// 建立用來挑選新待辦檔的瀏覽器。 / Builds a browser for picking a different todo file.
    fn browse_for_new_file(&self) -> DirectoryBrowser;
}

/// 以本機文字檔為後盾的待辦清單儲存。 / Todo-list storage backed by a local text file.
pub struct LocalFileStore {
    path: PathBuf,
    lines: Vec<String>,
    format: TextFormat,
    debounce: Duration,
    watcher: Option<FileMonitor>,
}

impl LocalFileStore {
    /// 開啟 `path`（空字串代表預設位置），必要時建立空檔。 / Opens `path`, or the default location when empty, creating an empty file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut store = Self {
            path: PathBuf::new(),
            lines: Vec::new(),
            format: TextFormat::default(),
            debounce: DEFAULT_WATCH_DEBOUNCE,
            watcher: None,
        };
        store.init(path)?;
        Ok(store)
    }

    /// 改指向新的檔案並停止既有監看。 / Re-points the store at a new file, stopping any active watch.
    ///
    /// 即使建立失敗，新路徑仍會被記錄，之後的操作會持續回報錯誤。 /
    /// The new path is recorded even when creating the file fails; later operations
    /// keep reporting errors until the problem is fixed outside the store.
    pub fn init(&mut self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        self.stop_watching();

        let requested = path.as_ref();
        let use_default = requested.as_os_str().is_empty();
        self.path = if use_default {
            default_todo_path()
        } else {
            absolutize(requested)
        };
        self.lines.clear();
        self.format = TextFormat::default();
        info!(path = %self.path.display(), "todo store bound");

        ensure_file(&self.path, use_default)?;
        self.format = sniff_format(&self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 上次成功載入的內容。 / Lines from the last successful load.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 寫入時沿用的格式。 / Format applied when writing.
    pub fn format(&self) -> TextFormat {
        self.format
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// 設定外部變更的合併時間窗；下次開始監看時生效。 / Sets the coalescing window; applies from the next `start_watching`.
    pub fn set_watch_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    fn load(&self, options: &LoadOptions) -> Result<(Vec<String>, TextFormat), StoreError> {
        let bytes = fs::read(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let decoded = text::decode(&bytes, options.encoding).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })?;
        Ok((text::split_lines(&decoded.text, options), decoded.format))
    }

    fn encode(&self, content: &str, with_bom: bool) -> Result<Vec<u8>, StoreError> {
        self.format
            .encode(content, with_bom)
            .map_err(|source| StoreError::Encode {
                path: self.path.clone(),
                source,
            })
    }
}

impl FileStore for LocalFileStore {
    fn is_authenticated(&self) -> bool {
        true
    }

    fn supports_authentication(&self) -> bool {
        false
    }

    fn is_local(&self) -> bool {
        true
    }

    fn deauthenticate(&mut self) {}

    fn start_login(&mut self) {}

    fn get(&mut self, options: &LoadOptions) -> Result<Vec<String>, StoreError> {
        match self.load(options) {
            Ok((lines, format)) => {
                debug!(path = %self.path.display(), lines = lines.len(), "loaded todo file");
                self.lines = lines.clone();
                self.format = format;
                Ok(lines)
            }
            Err(err) => {
                warn!(error = %err, "todo file could not be loaded, buffer cleared");
                self.lines.clear();
                Err(err)
            }
        }
    }

    fn store(&mut self, content: &str) -> Result<(), StoreError> {
        let bytes = self.encode(content, self.format.has_bom)?;
        write_atomic(&self.path, &bytes).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn append(&mut self, content: &str) -> Result<(), StoreError> {
        let bytes = self.encode(content, false)?;
        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new().append(true).open(&self.path)?;
            file.write_all(&bytes)?;
            file.sync_data()
        };
        write().map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn start_watching(&mut self, on_change: ChangeCallback) -> Result<bool, StoreError> {
        if self.watcher.is_some() {
            debug!(path = %self.path.display(), "already watching, ignoring start");
            return Ok(false);
        }
        let monitor = FileMonitor::start(&self.path, self.debounce, on_change).map_err(
            |source| StoreError::Watch {
                path: self.path.clone(),
                source,
            },
        )?;
        self.watcher = Some(monitor);
        Ok(true)
    }

    fn stop_watching(&mut self) {
        if let Some(monitor) = self.watcher.take() {
            monitor.stop();
        }
    }

    fn browse_for_new_file(&self) -> DirectoryBrowser {
        let start = self.path.parent().unwrap_or_else(|| Path::new("/"));
        DirectoryBrowser::new(start, true)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn ensure_file(path: &Path, create_parent: bool) -> Result<(), StoreError> {
    let create_err = |source: io::Error| StoreError::Create {
        path: path.to_path_buf(),
        source,
    };

    // 預設位置屬於本程式，可自行建立上層資料夾。 / The default location belongs to us, so its parent may be created.
    if create_parent {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(create_err)?;
        }
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            debug!(path = %path.display(), "created empty todo file");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if path.is_file() {
                Ok(())
            } else {
                Err(create_err(io::Error::new(
                    ErrorKind::Other,
                    "path exists but is not a regular file",
                )))
            }
        }
        Err(err) => Err(create_err(err)),
    }
}

// 既有檔案的格式；讀不到或無法解碼時用預設值，之後的寫入仍可覆寫。 /
// Format of the existing file. Unreadable or undecodable content falls back to the
// default so a later `store` can still replace it.
fn sniff_format(path: &Path) -> TextFormat {
    let detected = fs::read(path)
        .map_err(|err| err.to_string())
        .and_then(|bytes| text::decode(&bytes, None).map_err(|err| err.to_string()));
    match detected {
        Ok(decoded) => decoded.format,
        Err(reason) => {
            warn!(path = %path.display(), %reason, "cannot detect todo file format, using UTF-8");
            TextFormat::default()
        }
    }
}

// 暫存檔放在真正目標旁邊（經符號連結解析），沿用其權限，fsync 後改名覆蓋。 /
// The temp file sits next to the real target (symlinks resolved), takes over its
// permissions, is synced and then renamed over it.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(err) => return Err(err),
    };
    let tmp_path = temp_path_for(&target);
    let result = (|| {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        if let Ok(existing) = fs::metadata(&target) {
            fs::set_permissions(&tmp_path, existing.permissions())?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &target)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// `dir/todo.txt` 的暫存檔為 `dir/.todo.txt.tmp`。 / The temp file for `dir/todo.txt` is `dir/.todo.txt.tmp`.
fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_else(|| OsStr::new("todo")));
    name.push(".tmp");
    target.with_file_name(name)
}
