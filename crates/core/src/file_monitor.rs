use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{AccessKind, AccessMode, CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{
    new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap,
};
use thiserror::Error;
use tracing::{debug, warn};

/// 監控檔案變更時可能回傳的錯誤。 / Error type for file monitoring operations.
#[derive(Debug, Error)]
pub enum FileMonitorError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("{0} has no parent directory to watch")]
    NoParent(PathBuf),
    #[error("cannot resolve watch directory {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 目標檔案的變更種類。 / How the watched file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// 寫入後關閉。 / Closed after being opened for writing.
    Written,
    Modified,
    /// 其他檔案被重新命名為目標檔案。 / Another file was renamed onto the target.
    MovedInto,
}

/// 合併後的一次變更通知。 / A coalesced change notification for the target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    /// 該批次中第一個相關事件的種類。 / Kind of the first relevant event in the batch.
    pub kind: ChangeKind,
}

/// 變更回呼；在去抖動執行緒上執行。 / Change callback, run on the debouncer's thread.
pub type ChangeCallback = Box<dyn FnMut(&FileChange) + Send + 'static>;

/// 監看單一檔案所在的資料夾，只回報目標檔案本身的變更。 /
/// Watches the parent directory of one file and reports changes to that file only.
///
/// 監看資料夾而非檔案，才能捕捉「寫入暫存檔再改名」的原子寫入。事件由
/// `notify-debouncer-full` 合併：每個事件最多延遲 `debounce` 加一個 tick，
/// 連續寫入不會無限延後通知。 /
/// Watching the directory rather than the file catches writers that save through a
/// temporary file and a rename, which replaces the inode. Events are batched by
/// `notify-debouncer-full`: each one is delivered at most `debounce` plus one tick
/// after it happened, so a steady stream of writes cannot postpone the callback
/// forever.
pub struct FileMonitor {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    target: PathBuf,
    active: Arc<AtomicBool>,
}

impl FileMonitor {
    /// 開始監看；同一批次內的事件只觸發一次回呼。 / Starts watching; each debounced batch triggers at most one callback.
    pub fn start(
        target: &Path,
        debounce: Duration,
        on_change: ChangeCallback,
    ) -> Result<Self, FileMonitorError> {
        let (dir, file_name) = match (target.parent(), target.file_name()) {
            (Some(dir), Some(name)) => (dir, name),
            _ => return Err(FileMonitorError::NoParent(target.to_path_buf())),
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let dir = fs::canonicalize(dir).map_err(|source| FileMonitorError::Resolve {
            path: dir.to_path_buf(),
            source,
        })?;
        let target = dir.join(file_name);

        let active = Arc::new(AtomicBool::new(true));
        let mut dispatcher = Dispatcher::new(target.clone(), Arc::clone(&active), on_change);
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => dispatcher.handle(&events),
                Err(errors) => {
                    for err in errors {
                        warn!(error = %err, "file watcher reported an error");
                    }
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)?;
        debouncer
            .cache()
            .add_root(&dir, RecursiveMode::NonRecursive);

        debug!(dir = %dir.display(), ?debounce, "watching todo directory");
        Ok(Self {
            _debouncer: debouncer,
            target,
            active,
        })
    }

    /// 被監看的目標檔案（父資料夾已正規化）。 / The watched file, with its parent directory canonicalised.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// 停止監看；已在執行的回呼不會被中斷。 / Stops watching. A callback already running is not interrupted.
    pub fn stop(self) {}
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        debug!(path = %self.target.display(), "stopped watching todo file");
    }
}

/// 將去抖動後的批次轉成回呼。 / Turns debounced batches into callbacks.
struct Dispatcher {
    target: PathBuf,
    active: Arc<AtomicBool>,
    on_change: ChangeCallback,
    last_dispatch: Option<Instant>,
}

impl Dispatcher {
    fn new(target: PathBuf, active: Arc<AtomicBool>, on_change: ChangeCallback) -> Self {
        Self {
            target,
            active,
            on_change,
            last_dispatch: None,
        }
    }

    // 早於上次回呼開始的事件已被該次重新載入看見，直接略過。 /
    // Events older than the start of the previous callback were already visible to it.
    fn handle(&mut self, events: &[DebouncedEvent]) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let since = self.last_dispatch;
        let Some(kind) = events
            .iter()
            .filter(|debounced| since.map_or(true, |at| debounced.time >= at))
            .find_map(|debounced| classify(&debounced.event, &self.target))
        else {
            return;
        };

        self.last_dispatch = Some(Instant::now());
        (self.on_change)(&FileChange {
            path: self.target.clone(),
            kind,
        });
    }
}

fn classify(event: &notify::Event, target: &Path) -> Option<ChangeKind> {
    let touches = |idx: usize| event.paths.get(idx).map(PathBuf::as_path) == Some(target);
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) if touches(0) => {
            Some(ChangeKind::Written)
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
            if touches(0) =>
        {
            Some(ChangeKind::Modified)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if touches(1) => {
            Some(ChangeKind::MovedInto)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) if touches(0) => {
            Some(ChangeKind::MovedInto)
        }
        // 去抖動器把從監看範圍外移入的檔案回報為 `Create(Any)`。 /
        // The debouncer reports a file moved in from outside the watched directory as `Create(Any)`.
        EventKind::Create(CreateKind::Any) if touches(0) => Some(ChangeKind::MovedInto),
        _ => None,
    }
}
