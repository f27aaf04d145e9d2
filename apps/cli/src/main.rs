use std::cell::RefCell;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use todostore_core::{
    BrowseError, DirectoryBrowser, FileStore, LoadOptions, LocalFileStore, Selection,
};
use todostore_settings::{
    config_dir, PreferencesStore, RecentFilesStore, PREFERENCES_FILE, RECENT_FILE,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TODOSTORE_LOG";
const DEFAULT_FILE_NAME: &str = "todo.txt";

#[derive(Parser)]
#[command(
    name = "todostore",
    about = "Read, write, watch and pick plain-text todo lists",
    author,
    version
)]
struct Cli {
    /// 偏好設定檔路徑。 / Preferences file (defaults to `<config_dir>/todostore/preferences.json`).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 本次使用的待辦檔，覆寫設定值。 / Todo file for this run, overriding the configured one.
    #[arg(long, short = 'f', global = true, value_name = "PATH")]
    file: Option<PathBuf>,
    /// 輸出除錯記錄。 / Emit debug logs on stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 顯示待辦檔內容。 / Print the todo list.
    Show(ShowArgs),
    /// 以新內容取代整個檔案。 / Replace the whole file with new content.
    Store(StoreArgs),
    /// 在檔尾附加項目。 / Append tasks to the end of the file.
    Append(AppendArgs),
    /// 監看外部修改並重新顯示。 / Watch for outside edits and reprint the list.
    Watch(WatchArgs),
    /// 互動式挑選新的待辦檔。 / Interactively pick a different todo file.
    Browse(BrowseArgs),
    /// 列出最近使用的待辦檔。 / List recently used todo files.
    Recent,
    /// 檢視或修改偏好設定。 / Inspect or change preferences.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args)]
struct ShowArgs {
    /// 加上行號。 / Prefix each line with its number.
    #[arg(long, short = 'n')]
    numbered: bool,
}

#[derive(Args)]
struct StoreArgs {
    /// 新的檔案內容。 / New file content.
    #[arg(value_name = "TEXT", required_unless_present = "stdin")]
    text: Option<String>,
    /// 由標準輸入讀取內容。 / Read the content from stdin.
    #[arg(long, conflicts_with = "text")]
    stdin: bool,
}

#[derive(Args)]
struct AppendArgs {
    /// 每個參數成為一行。 / Each argument becomes one line.
    #[arg(value_name = "TEXT", required = true)]
    lines: Vec<String>,
}

#[derive(Args)]
struct WatchArgs {
    /// 收到指定次數的變更後結束。 / Exit after this many reloads.
    #[arg(long, value_name = "N")]
    count: Option<usize>,
}

#[derive(Args)]
struct BrowseArgs {
    /// 列出所有可讀檔案，而非只有 `.txt`。 / List every readable file, not only `.txt`.
    #[arg(long)]
    all: bool,
    /// 起始資料夾；預設為目前待辦檔所在處。 / Start directory, defaulting to the current todo file's folder.
    #[arg(long, value_name = "DIR")]
    start: Option<PathBuf>,
    /// 挑選資料夾，在其中使用 `todo.txt`。 / Pick a directory and use `todo.txt` inside it.
    #[arg(long)]
    directory: bool,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// 以 JSON 顯示目前設定。 / Print the current preferences as JSON.
    Show,
    /// 設定預設待辦檔。 / Set the default todo file.
    SetPath(SetPathArgs),
}

#[derive(Args)]
struct SetPathArgs {
    /// 待辦檔路徑；空字串代表預設位置。 / Todo file path; an empty string restores the default.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        config,
        file,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose);

    let mut session = Session::load(config, file)?;
    match command {
        Commands::Show(args) => execute_show(&session, args),
        Commands::Store(args) => execute_store(&session, args),
        Commands::Append(args) => execute_append(&session, args),
        Commands::Watch(args) => execute_watch(&session, args),
        Commands::Browse(args) => execute_browse(&mut session, args),
        Commands::Recent => execute_recent(&session),
        Commands::Config(ConfigCommand::Show) => execute_config_show(&session),
        Commands::Config(ConfigCommand::SetPath(args)) => {
            let path = args.path;
            session.switch_todo_file(&path)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("todostore=debug,todostore_core=debug,todostore_settings=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// 單次執行共用的設定與最近清單。 / Preferences and history shared by one invocation.
struct Session {
    preferences: PreferencesStore,
    recent: RecentFilesStore,
    file_override: Option<PathBuf>,
}

impl Session {
    fn load(config: Option<PathBuf>, file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = config.unwrap_or_else(|| config_dir().join(PREFERENCES_FILE));
        let preferences = PreferencesStore::load(&config_path)
            .with_context(|| format!("failed to load preferences from {}", config_path.display()))?;
        let recent_path = config_path
            .parent()
            .map(|dir| dir.join(RECENT_FILE))
            .unwrap_or_else(|| PathBuf::from(RECENT_FILE));
        let recent = RecentFilesStore::load(&recent_path, preferences.preferences().recent.capacity)
            .with_context(|| format!("failed to load recent files from {}", recent_path.display()))?;
        debug!(config = %config_path.display(), "session loaded");
        Ok(Self {
            preferences,
            recent,
            file_override,
        })
    }

    fn todo_path(&self) -> PathBuf {
        match &self.file_override {
            Some(path) => path.clone(),
            None => PathBuf::from(&self.preferences.preferences().store.todo_path),
        }
    }

    fn load_options(&self) -> LoadOptions {
        self.preferences.preferences().store.load_options()
    }

    fn open_store(&self) -> Result<LocalFileStore> {
        let requested = self.todo_path();
        let mut store = LocalFileStore::open(&requested)
            .with_context(|| format!("cannot open todo file {}", requested.display()))?;
        store.set_watch_debounce(self.preferences.preferences().store.watch_debounce());
        Ok(store)
    }

    /// 將設定與最近清單指向新的待辦檔。 / Points preferences and history at a new todo file.
    fn switch_todo_file(&mut self, path: &Path) -> Result<()> {
        let store = LocalFileStore::open(path)
            .with_context(|| format!("cannot use {} as todo file", path.display()))?;
        let resolved = store.path().to_path_buf();
        let stored = if path.as_os_str().is_empty() {
            String::new()
        } else {
            resolved.to_string_lossy().into_owned()
        };
        self.preferences
            .update(|prefs| prefs.store.todo_path = stored.clone())
            .context("failed to save preferences")?;
        let capacity = self.preferences.preferences().recent.capacity;
        self.recent
            .set_capacity(capacity)
            .context("failed to update recent files")?;
        self.recent
            .add(resolved.clone())
            .context("failed to update recent files")?;
        info!(path = %resolved.display(), "todo file switched");
        println!("Using {}", resolved.display());
        Ok(())
    }
}

fn execute_show(session: &Session, args: ShowArgs) -> Result<()> {
    let mut store = session.open_store()?;
    let lines = store.get(&session.load_options())?;
    let mut out = io::stdout().lock();
    print_lines(&mut out, &lines, args.numbered)?;
    Ok(())
}

fn print_lines(out: &mut impl Write, lines: &[String], numbered: bool) -> io::Result<()> {
    for (index, line) in lines.iter().enumerate() {
        if numbered {
            writeln!(out, "{:>3} {line}", index + 1)?;
        } else {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()
}

fn execute_store(session: &Session, args: StoreArgs) -> Result<()> {
    let mut content = match args.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }

    let mut store = session.open_store()?;
    store.store(&content)?;
    println!("Wrote {}", store.path().display());
    Ok(())
}

fn execute_append(session: &Session, args: AppendArgs) -> Result<()> {
    let mut content = args.lines.join("\n");
    content.push('\n');

    let mut store = session.open_store()?;
    store.append(&content)?;
    println!(
        "Appended {} line(s) to {}",
        args.lines.len(),
        store.path().display()
    );
    Ok(())
}

fn execute_watch(session: &Session, args: WatchArgs) -> Result<()> {
    let options = session.load_options();
    let store = Arc::new(Mutex::new(session.open_store()?));
    let (tx, rx) = mpsc::channel::<Result<Vec<String>, String>>();

    {
        let mut guard = store
            .lock()
            .map_err(|_| anyhow!("todo store lock poisoned"))?;
        let lines = guard.get(&options)?;
        let mut out = io::stdout().lock();
        writeln!(out, "Watching {}", guard.path().display())?;
        print_lines(&mut out, &lines, false)?;

        let reloader = Arc::clone(&store);
        let reload_options = options.clone();
        guard.start_watching(Box::new(move |change| {
            debug!(path = %change.path.display(), kind = ?change.kind, "reloading after change");
            let Ok(mut store) = reloader.lock() else {
                return;
            };
            let reloaded = store.get(&reload_options).map_err(|err| err.to_string());
            let _ = tx.send(reloaded);
        }))?;
    }

    let mut reloads = 0usize;
    for reloaded in rx {
        let mut out = io::stdout().lock();
        match reloaded {
            Ok(lines) => {
                writeln!(out, "-- reloaded ({} lines)", lines.len())?;
                print_lines(&mut out, &lines, false)?;
            }
            Err(message) => warn!(%message, "reload failed"),
        }
        reloads += 1;
        if args.count.is_some_and(|limit| reloads >= limit) {
            break;
        }
    }

    if let Ok(mut guard) = store.lock() {
        guard.stop_watching();
    }
    Ok(())
}

fn execute_browse(session: &mut Session, args: BrowseArgs) -> Result<()> {
    let text_only = !args.all && session.preferences.preferences().browser.text_only;
    let mut browser = match args.start {
        Some(start) => DirectoryBrowser::new(start, text_only),
        None => {
            let store = session.open_store()?;
            let browser = store.browse_for_new_file();
            if browser.text_only() == text_only {
                browser
            } else {
                DirectoryBrowser::new(browser.current_dir(), text_only)
            }
        }
    };

    let chosen: Rc<RefCell<Option<PathBuf>>> = Rc::default();
    if args.directory {
        let sink = Rc::clone(&chosen);
        browser.add_directory_listener(move |dir: &Path| {
            *sink.borrow_mut() = Some(dir.join(DEFAULT_FILE_NAME));
        });
    } else {
        let sink = Rc::clone(&chosen);
        browser.add_file_listener(move |file: &Path| {
            *sink.borrow_mut() = Some(file.to_path_buf());
        });
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout().lock();
    run_browser(&mut browser, args.directory, &mut input, &mut out)?;
    drop(out);

    let picked = chosen.borrow_mut().take();
    match picked {
        Some(path) => session.switch_todo_file(&path),
        None => {
            println!("No file chosen");
            Ok(())
        }
    }
}

/// 逐次列出資料夾並讀取選擇，直到選定或輸入結束。 /
/// Lists the directory and reads a choice until something is picked or input ends.
fn run_browser(
    browser: &mut DirectoryBrowser,
    pick_directory: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let mut line = String::new();
    while !browser.is_finished() {
        writeln!(out, "{}", browser.current_dir().display())?;
        for (index, entry) in browser.entries().iter().enumerate() {
            writeln!(out, "{:>3}  {entry}", index + 1)?;
        }
        if pick_directory {
            write!(out, "number, name, '.' to use this folder, or q: ")?;
        } else {
            write!(out, "number, name, or q: ")?;
        }
        out.flush()?;

        line.clear();
        if input.read_line(&mut line).context("failed to read choice")? == 0 {
            writeln!(out)?;
            return Ok(());
        }
        let answer = line.trim();
        match answer {
            "" => continue,
            "q" => return Ok(()),
            "." if pick_directory => {
                browser.choose_current_directory()?;
                continue;
            }
            _ => {}
        }

        let name = match answer.parse::<usize>() {
            Ok(number) => match number.checked_sub(1).and_then(|i| browser.entries().get(i)) {
                Some(entry) => entry.clone(),
                None => {
                    writeln!(out, "no entry numbered {number}")?;
                    continue;
                }
            },
            Err(_) => answer.to_string(),
        };

        match browser.select(&name) {
            Ok(Selection::Navigated(dir)) => debug!(dir = %dir.display(), "entered directory"),
            Ok(Selection::FileChosen(file)) => {
                if pick_directory {
                    bail!("{} is a file; pick a folder or enter '.'", file.display());
                }
            }
            Err(err @ (BrowseError::UnknownEntry(_) | BrowseError::NotFound(_))) => {
                writeln!(out, "{err}")?;
                browser.refresh();
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn execute_recent(session: &Session) -> Result<()> {
    let mut out = io::stdout().lock();
    for path in session.recent.iter() {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

fn execute_config_show(session: &Session) -> Result<()> {
    let payload = serde_json::to_string_pretty(session.preferences.preferences())
        .context("failed to serialize preferences")?;
    println!("{payload}");
    Ok(())
}
