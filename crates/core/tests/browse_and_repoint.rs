use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::tempdir;
use todostore_core::{
    DirectoryBrowser, FileStore, LoadOptions, LocalFileStore, Selection, PARENT_DIR,
};

/// 從目前待辦檔瀏覽至另一個檔案，並把儲存改指向它。 /
/// Browses from the current todo file to another list and re-points the store at it.
#[test]
fn chosen_file_becomes_new_backing_file() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir(root.join("work")).unwrap();
    fs::create_dir(root.join("home")).unwrap();
    fs::write(root.join("home").join("chores.txt"), "sweep floor\nwater plants\n").unwrap();
    fs::write(root.join("home").join("photo.jpg"), [0xFF, 0xD8]).unwrap();

    let mut store = LocalFileStore::open(root.join("work").join("todo.txt")).unwrap();
    store.store("(A) ship release\n").unwrap();

    let mut browser = store.browse_for_new_file();
    assert_eq!(browser.current_dir(), root.join("work"));
    assert_eq!(browser.entries(), [PARENT_DIR, "todo.txt"]);

    let picked: Rc<RefCell<Vec<PathBuf>>> = Rc::default();
    let sink = Rc::clone(&picked);
    browser.add_file_listener(move |path: &Path| sink.borrow_mut().push(path.to_path_buf()));

    browser.select(PARENT_DIR).unwrap();
    assert_eq!(browser.entries(), [PARENT_DIR, "home", "work"]);
    browser.select("home").unwrap();
    assert_eq!(browser.entries(), [PARENT_DIR, "chores.txt"]);

    let chosen = match browser.select("chores.txt").unwrap() {
        Selection::FileChosen(path) => path,
        other => panic!("expected a file, got {other:?}"),
    };
    assert_eq!(*picked.borrow(), vec![chosen.clone()]);

    store.init(&chosen).unwrap();
    assert_eq!(store.path(), root.join("home").join("chores.txt"));
    assert_eq!(
        store.get(&LoadOptions::default()).unwrap(),
        ["sweep floor", "water plants"]
    );
}

#[test]
fn unfiltered_browser_shows_every_readable_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "").unwrap();
    fs::write(dir.path().join("b.md"), "").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let browser = DirectoryBrowser::new(dir.path(), false);
    assert_eq!(
        browser.list_entries(dir.path()),
        [PARENT_DIR, "a.txt", "b.md", "sub"]
    );
}
