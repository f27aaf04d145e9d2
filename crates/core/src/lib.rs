pub mod browser;
pub mod file_monitor;
pub mod listeners;
pub mod store;
pub mod text;

pub use browser::{browse_root, BrowseError, DirectoryBrowser, Selection, PARENT_DIR};
pub use file_monitor::{ChangeCallback, ChangeKind, FileChange, FileMonitor, FileMonitorError};
pub use listeners::{DirectorySelectedListener, FileSelectedListener, ListenerId, ListenerList};
pub use store::{default_todo_path, FileStore, LocalFileStore, StoreError, APP_DIR_NAME};
pub use text::{Encoding, LegacyEncoding, LineEnding, LoadOptions, TextError, TextFormat};
