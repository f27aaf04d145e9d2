use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn todostore(config: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("todostore")?;
    cmd.arg("--config").arg(config).env_remove("TODOSTORE_LOG");
    Ok(cmd)
}

/// 寫入、附加再讀回。 / Stores, appends and reads the list back.
#[test]
fn store_append_and_show() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("config").join("preferences.json");
    let todo = dir.path().join("todo.txt");

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["store", "(A) call mom"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert_eq!(fs::read_to_string(&todo)?, "(A) call mom\n");

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["append", "buy milk", "file taxes +home"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Appended 2 line(s)"));

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["show", "--numbered"])
        .assert()
        .success()
        .stdout("  1 (A) call mom\n  2 buy milk\n  3 file taxes +home\n");
    Ok(())
}

#[test]
fn store_from_stdin_keeps_crlf_files_crlf() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    let todo = dir.path().join("todo.txt");
    fs::write(&todo, "old task\r\n")?;

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["store", "--stdin"])
        .write_stdin("first\nsecond\n")
        .assert()
        .success();

    assert_eq!(fs::read(&todo)?, b"first\r\nsecond\r\n");
    Ok(())
}

#[test]
fn store_overwrites_file_that_cannot_be_decoded() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    let todo = dir.path().join("todo.txt");
    fs::write(&todo, b"\xFF\xFEa\x00b")?;

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .arg("show")
        .assert()
        .failure();

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["store", "recovered"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&todo)?, "recovered\n");
    Ok(())
}

#[test]
fn append_keeps_utf16_file_readable() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    let todo = dir.path().join("todo.txt");
    fs::write(&todo, b"\xFF\xFEo\x00l\x00d\x00\n\x00")?;

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .args(["append", "new"])
        .assert()
        .success();

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .arg("show")
        .assert()
        .success()
        .stdout("old\nnew\n");
    Ok(())
}

#[test]
fn missing_file_is_created_empty() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    let todo = dir.path().join("fresh.txt");

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .arg("show")
        .assert()
        .success()
        .stdout("");
    assert!(todo.is_file());
    Ok(())
}

#[test]
fn unreachable_file_reports_error() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    let todo = dir.path().join("no").join("such").join("todo.txt");

    todostore(&config)?
        .arg("--file")
        .arg(&todo)
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open todo file"));
    Ok(())
}

/// 設定預設檔案後，不帶 `--file` 也會使用它。 / The configured path is used when `--file` is absent.
#[test]
fn set_path_updates_preferences_and_recent() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let root = dir.path().canonicalize()?;
    let config = root.join("preferences.json");
    let todo = root.join("lists").join("home.txt");
    fs::create_dir(root.join("lists"))?;
    fs::write(&todo, "water plants\n")?;

    todostore(&config)?
        .args(["config", "set-path"])
        .arg(&todo)
        .assert()
        .success()
        .stdout(predicate::str::contains("Using"));

    todostore(&config)?
        .arg("show")
        .assert()
        .success()
        .stdout("water plants\n");

    todostore(&config)?
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("home.txt"));

    todostore(&config)?
        .arg("recent")
        .assert()
        .success()
        .stdout(format!("{}\n", todo.display()));
    assert!(root.join("recent.json").is_file());
    Ok(())
}

#[test]
fn broken_preferences_fail_with_context() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("preferences.json");
    fs::write(&config, "{ nope")?;

    todostore(&config)?
        .arg("recent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load preferences"));
    Ok(())
}
