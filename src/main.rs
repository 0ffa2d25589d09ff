use anyhow::{bail, Context, Result};
use chrono::{Datelike, Days, Local};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use todo_panel::domain::{
    detect_links, due_label, list_rows, subtask_progress, tree_connector, DueStatus, Frequency,
    LinkKind, Patch, RecurrenceRule, Section, SettingsUpdate, SortOrder, SubTaskUpdate, Timestamp,
    Todo, TodoId, TodoUpdate,
};
use todo_panel::persistence::{
    init_local_dir, resolve_data_dir, DocumentStore, LoadSource, StorePaths,
};
use todo_panel::{load_config, save_config, Config, TodoRepository};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todo-panel")]
#[command(version, about = "A local to-do list with safe, debounced JSON storage", long_about = None)]
struct Cli {
    /// Data directory (defaults to $TODO_PANEL_DIR, a .todo-panel above the
    /// current directory, or ~/.todo-panel)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// Log persistence decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a local .todo-panel directory in the current directory
    Init,
    /// Show pending and completed todos
    List {
        /// Only todos whose content or subtasks contain this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Add a todo
    Add {
        content: String,
        /// Due date: YYYY-MM-DD, ISO 8601, today, tomorrow or +N days
        #[arg(short, long, value_parser = parse_due)]
        due: Option<Timestamp>,
        #[command(flatten)]
        repeat: RepeatArgs,
    },
    /// Change a todo's content, due date or recurrence
    Edit {
        id: String,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(short, long, value_parser = parse_due, conflicts_with = "no_due")]
        due: Option<Timestamp>,
        /// Remove the due date
        #[arg(long)]
        no_due: bool,
        #[command(flatten)]
        repeat: RepeatArgs,
        /// Stop repeating
        #[arg(long, conflicts_with = "every")]
        no_repeat: bool,
    },
    /// Mark a todo done, or pending again
    Toggle { id: String },
    /// Delete a todo and its subtasks
    Rm { id: String },
    /// Move a todo to a position within its section (0 = top)
    Move { id: String, position: usize },
    /// Set the full order of a section
    Reorder {
        /// pending or completed
        #[arg(value_parser = parse_section)]
        section: Section,
        ids: Vec<String>,
    },
    /// Sort by manual, dueDate_asc, dueDate_desc or today_first
    Sort {
        #[arg(value_parser = parse_sort_order)]
        mode: SortOrder,
    },
    /// Manage subtasks
    #[command(subcommand)]
    Sub(SubCommands),
    /// Show or change display settings
    Settings {
        /// Pending:completed split, e.g. 9:1 or 0.75:0.25
        #[arg(long, value_parser = parse_split)]
        split: Option<[f64; 2]>,
        #[arg(long)]
        always_on_top: Option<bool>,
    },
    /// List or restore backups
    #[command(subcommand)]
    Backups(BackupCommands),
    /// Load the data file, migrating or repairing it if needed
    Migrate,
    /// Show links and paths found in a todo
    Links { id: String },
    /// Show or change storage settings
    Config {
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[arg(long)]
        max_backups: Option<usize>,
        #[arg(long)]
        max_write_attempts: Option<u32>,
    },
}

#[derive(Subcommand)]
enum SubCommands {
    Add { parent: String, content: String },
    Edit {
        parent: String,
        id: String,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(short, long, value_parser = parse_due, conflicts_with = "no_due")]
        due: Option<Timestamp>,
        #[arg(long)]
        no_due: bool,
    },
    Toggle { parent: String, id: String },
    Rm { parent: String, id: String },
    Reorder { parent: String, ids: Vec<String> },
}

#[derive(Subcommand)]
enum BackupCommands {
    List,
    /// Restore a backup by file name, or the newest valid one
    Restore { name: Option<String> },
}

#[derive(Args)]
struct RepeatArgs {
    /// Repeat daily, weekly or monthly once completed
    #[arg(long, value_parser = parse_frequency)]
    every: Option<Frequency>,
    /// Weekdays for weekly repeats, e.g. mon,wed,fri or 0,2,4
    #[arg(long, requires = "every")]
    on: Option<String>,
    /// Last date a repeat may fall on
    #[arg(long, requires = "every", value_parser = parse_due)]
    until: Option<Timestamp>,
    /// Copy subtasks into each new instance
    #[arg(long, requires = "every")]
    copy_subtasks: bool,
}

impl RepeatArgs {
    fn rule(self) -> Result<Option<RecurrenceRule>> {
        let Some(frequency) = self.every else {
            return Ok(None);
        };
        let weekdays = self
            .on
            .as_deref()
            .map(parse_weekdays)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        let rule = RecurrenceRule::new(
            frequency,
            self.until,
            weekdays,
            self.copy_subtasks,
            Local::now().date_naive(),
        )?;
        Ok(Some(rule))
    }
}

/// Last year RFC 3339 can write with four digits
const MAX_DUE_YEAR: i32 = 9999;

fn parse_due(s: &str) -> Result<Timestamp, String> {
    let offset = match s.trim() {
        "today" => Some(0),
        "tomorrow" => Some(1),
        other => other.strip_prefix('+').and_then(|n| n.parse::<u64>().ok()),
    };
    match offset {
        Some(days) => Local::now()
            .date_naive()
            .checked_add_days(Days::new(days))
            .filter(|day| day.year() <= MAX_DUE_YEAR)
            .map(Timestamp::from_local_date)
            .ok_or_else(|| format!("date out of range: '{}'", s)),
        None => s.parse().map_err(|e: todo_panel::domain::TimestampParseError| e.to_string()),
    }
}

fn parse_section(s: &str) -> Result<Section, String> {
    Section::from_name(s).ok_or_else(|| format!("unknown section '{}' (pending or completed)", s))
}

fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    SortOrder::from_key(s).ok_or_else(|| {
        let keys: Vec<&str> = SortOrder::all().iter().map(|m| m.as_key()).collect();
        format!("unknown sort mode '{}' (one of {})", s, keys.join(", "))
    })
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    Frequency::from_name(s).ok_or_else(|| format!("unknown frequency '{}' (daily, weekly or monthly)", s))
}

fn parse_weekdays(s: &str) -> Result<Vec<u8>, String> {
    const NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
    s.split(',')
        .map(|part| {
            let part = part.trim().to_lowercase();
            part.parse::<u8>()
                .ok()
                .or_else(|| NAMES.iter().position(|n| part.starts_with(n)).map(|i| i as u8))
                .ok_or_else(|| format!("unknown weekday '{}'", part))
        })
        .collect()
}

fn parse_split(s: &str) -> Result<[f64; 2], String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected A:B, got '{}'", s))?;
    let a = a.trim().parse().map_err(|_| format!("invalid number '{}'", a))?;
    let b = b.trim().parse().map_err(|_| format!("invalid number '{}'", b))?;
    Ok([a, b])
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Init = cli.command {
        let cwd = std::env::current_dir().context("Could not determine current directory")?;
        let dir = init_local_dir(&cwd)?;
        println!("Initialized data directory: {}", dir.display());
        println!("todo-panel will use it from this directory and any below it.");
        return Ok(());
    }

    let dir = resolve_data_dir(cli.dir.as_deref())?;
    let paths = StorePaths::new(&dir);
    let config = load_config(paths.config_file())?;

    match cli.command {
        Commands::Config {
            debounce_ms,
            max_backups,
            max_write_attempts,
        } => return run_config(&paths, config, debounce_ms, max_backups, max_write_attempts),
        Commands::Migrate => return run_migrate(paths, &config),
        command => {
            let repo = TodoRepository::open(paths, &config)
                .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
            let result = run(&repo, command);
            let flushed = repo.flush().context("Failed to save changes");
            result?;
            flushed?;
        }
    }
    Ok(())
}

fn run(repo: &TodoRepository, command: Commands) -> Result<()> {
    match command {
        Commands::List { search } => print_list(repo, search.as_deref()),
        Commands::Add {
            content,
            due,
            repeat,
        } => {
            let rule = repeat.rule()?;
            let mut todo = repo.create(&content, due)?;
            if let Some(rule) = rule {
                todo = repo.update(&todo.id, TodoUpdate::default().recurrence(Patch::Set(rule)))?;
            }
            println!("Added {}  {}", todo.id.short(), todo.content);
        }
        Commands::Edit {
            id,
            content,
            due,
            no_due,
            repeat,
            no_repeat,
        } => {
            let id = repo.resolve_id(&id)?;
            let mut update = TodoUpdate::default();
            if let Some(content) = content {
                update = update.content(content);
            }
            if let Some(due) = due {
                update = update.due_date(Patch::Set(due));
            } else if no_due {
                update = update.due_date(Patch::Clear);
            }
            if let Some(rule) = repeat.rule()? {
                update = update.recurrence(Patch::Set(rule));
            } else if no_repeat {
                update = update.recurrence(Patch::Clear);
            }
            if update.is_empty() {
                bail!("Nothing to change: pass --content, --due, --no-due, --every or --no-repeat");
            }
            let todo = repo.update(&id, update)?;
            println!("Updated {}  {}", todo.id.short(), todo.content);
        }
        Commands::Toggle { id } => {
            let id = repo.resolve_id(&id)?;
            let before = repo.document().todos.len();
            let todo = repo.toggle(&id)?;
            let mark = if todo.completed { "Done" } else { "Reopened" };
            println!("{} {}  {}", mark, todo.id.short(), todo.content);
            if repo.document().todos.len() > before {
                println!("Next occurrence added to pending");
            }
        }
        Commands::Rm { id } => {
            let id = repo.resolve_id(&id)?;
            let removed = repo.delete(&id)?;
            println!("Deleted {}  {}", removed.id.short(), removed.content);
        }
        Commands::Move { id, position } => {
            let id = repo.resolve_id(&id)?;
            let section = repo.get(&id)?.section();
            let landed = repo.move_todo(&id, section, position)?;
            println!("Moved {} to position {} in {}", id.short(), landed, section);
        }
        Commands::Reorder { section, ids } => {
            let ids = ids
                .iter()
                .map(|id| repo.resolve_id(id))
                .collect::<todo_panel::Result<Vec<TodoId>>>()?;
            repo.reorder(section, &ids)?;
            println!("Reordered {} ({} todos)", section, ids.len());
        }
        Commands::Sort { mode } => {
            let updated = repo.set_sort_mode(mode)?;
            println!("Sorting by {} ({} orders updated)", mode, updated);
        }
        Commands::Sub(sub) => run_sub(repo, sub)?,
        Commands::Settings {
            split,
            always_on_top,
        } => {
            let settings = if split.is_some() || always_on_top.is_some() {
                repo.update_settings(SettingsUpdate {
                    split_ratio: split,
                    always_on_top,
                })?
            } else {
                repo.settings()
            };
            println!("sortOrder:   {}", settings.sort_order);
            println!("splitRatio:  {}:{}", settings.split_ratio[0], settings.split_ratio[1]);
            println!("alwaysOnTop: {}", settings.always_on_top);
        }
        Commands::Backups(BackupCommands::List) => {
            let backups = repo.backups()?;
            if backups.is_empty() {
                println!("No backups in {}", repo.paths().backup_dir().display());
            }
            for entry in backups {
                println!("{:<8} {:>8} B  {}", entry.kind.label(), entry.size, entry.name);
            }
        }
        Commands::Backups(BackupCommands::Restore { name }) => {
            let doc = repo.restore_backup(name.as_deref())?;
            println!("Restored {} todos", doc.todos.len());
        }
        Commands::Links { id } => {
            let id = repo.resolve_id(&id)?;
            let todo = repo.get(&id)?;
            let links = detect_links(&todo.content);
            if links.is_empty() {
                println!("No links in {}", id.short());
            }
            for link in links {
                let kind = match link.kind {
                    LinkKind::Url => "url",
                    LinkKind::Path => "path",
                };
                println!("{:<4} {}", kind, link.target());
            }
        }
        Commands::Init | Commands::Migrate | Commands::Config { .. } => {}
    }
    Ok(())
}

fn run_sub(repo: &TodoRepository, command: SubCommands) -> Result<()> {
    match command {
        SubCommands::Add { parent, content } => {
            let parent = repo.resolve_id(&parent)?;
            let subtask = repo.add_subtask(&parent, &content)?;
            println!("Added {}  {}", subtask.id.short(), subtask.content);
        }
        SubCommands::Edit {
            parent,
            id,
            content,
            due,
            no_due,
        } => {
            let parent = repo.resolve_id(&parent)?;
            let id = repo.resolve_subtask_id(&parent, &id)?;
            let mut update = SubTaskUpdate::default();
            if let Some(content) = content {
                update = update.content(content);
            }
            if let Some(due) = due {
                update = update.due_date(Patch::Set(due));
            } else if no_due {
                update = update.due_date(Patch::Clear);
            }
            if update.is_empty() {
                bail!("Nothing to change: pass --content, --due or --no-due");
            }
            let subtask = repo.update_subtask(&parent, &id, update)?;
            println!("Updated {}  {}", subtask.id.short(), subtask.content);
        }
        SubCommands::Toggle { parent, id } => {
            let parent = repo.resolve_id(&parent)?;
            let id = repo.resolve_subtask_id(&parent, &id)?;
            let subtask = repo.toggle_subtask(&parent, &id)?;
            let mark = if subtask.completed { "Done" } else { "Reopened" };
            println!("{} {}  {}", mark, subtask.id.short(), subtask.content);
        }
        SubCommands::Rm { parent, id } => {
            let parent = repo.resolve_id(&parent)?;
            let id = repo.resolve_subtask_id(&parent, &id)?;
            let removed = repo.delete_subtask(&parent, &id)?;
            println!("Deleted {}  {}", removed.id.short(), removed.content);
        }
        SubCommands::Reorder { parent, ids } => {
            let parent = repo.resolve_id(&parent)?;
            let ids = ids
                .iter()
                .map(|id| repo.resolve_subtask_id(&parent, id))
                .collect::<todo_panel::Result<Vec<TodoId>>>()?;
            repo.reorder_subtasks(&parent, &ids)?;
            println!("Reordered {} subtasks", ids.len());
        }
    }
    Ok(())
}

fn due_marker(todo: &Todo) -> String {
    let today = Local::now().date_naive();
    let Some(due) = todo.due_date else {
        return String::new();
    };
    let flag = match todo.due_status(today) {
        Some(DueStatus::OverdueSevere) => "!!! ",
        Some(DueStatus::OverdueModerate) => "!! ",
        Some(DueStatus::OverdueMild) => "! ",
        _ => "",
    };
    format!("  ({}{}, {})", flag, due.local_date(), due_label(&due, today))
}

fn print_list(repo: &TodoRepository, search: Option<&str>) {
    let mut doc = repo.document();
    if let Some(query) = search {
        let keep: Vec<TodoId> = repo.search(query).into_iter().map(|t| t.id).collect();
        doc.todos.retain(|t| keep.contains(&t.id));
    }
    let mode = doc.settings.sort_order;
    let rows = list_rows(&doc, mode, Local::now().date_naive());

    let mut current: Option<Section> = None;
    for row in &rows {
        if current != Some(row.section) {
            current = Some(row.section);
            let count = doc.todos.iter().filter(|t| t.section() == row.section).count();
            println!("{} ({})", row.section, count);
        }
        match row.subtask_index.and_then(|i| row.todo.subtasks.get(i)) {
            None => {
                let todo = row.todo;
                let check = if todo.completed { "[x]" } else { "[ ]" };
                let progress = subtask_progress(todo)
                    .map(|p| format!("  [{}]", p))
                    .unwrap_or_default();
                let repeat = todo
                    .recurrence
                    .as_ref()
                    .map(|r| format!("  (repeats {})", r.describe()))
                    .unwrap_or_default();
                println!(
                    "  {} {}  {}{}{}{}",
                    check,
                    todo.id.short(),
                    todo.content,
                    due_marker(todo),
                    progress,
                    repeat
                );
            }
            Some(subtask) => {
                let check = if subtask.completed { "[x]" } else { "[ ]" };
                println!(
                    "      {} {} {}  {}",
                    tree_connector(row.is_last),
                    check,
                    subtask.id.short(),
                    subtask.content
                );
            }
        }
    }
    if rows.is_empty() {
        println!("Nothing to do (sorted by {})", mode);
    }
}

fn run_migrate(paths: StorePaths, config: &Config) -> Result<()> {
    paths.ensure()?;
    let store = DocumentStore::new(paths, config);
    let loaded = store.load()?;
    match &loaded.source {
        LoadSource::Missing => println!("No data file yet; nothing to migrate"),
        LoadSource::Primary if !loaded.needs_write => println!("Data file is up to date"),
        LoadSource::Primary => {
            store.write(&loaded.document)?;
            println!(
                "Repaired data file: {} records skipped, {} fields fixed",
                loaded.report.skipped, loaded.report.repaired
            );
        }
        LoadSource::Migrated { legacy_backup } => println!(
            "Migrated {} data file ({} todos, {} records skipped); original kept at {}",
            loaded.report.shape,
            loaded.document.todos.len(),
            loaded.report.skipped,
            legacy_backup.display()
        ),
        LoadSource::Backup { name } => {
            store.write(&loaded.document)?;
            println!("Data file was corrupt; restored {} todos from {}", loaded.document.todos.len(), name);
        }
    }
    Ok(())
}

fn run_config(
    paths: &StorePaths,
    mut config: Config,
    debounce_ms: Option<u64>,
    max_backups: Option<usize>,
    max_write_attempts: Option<u32>,
) -> Result<()> {
    let changed = debounce_ms.is_some() || max_backups.is_some() || max_write_attempts.is_some();
    if let Some(ms) = debounce_ms {
        config.debounce_ms = ms;
    }
    if let Some(n) = max_backups {
        if n == 0 {
            bail!("--max-backups must be at least 1");
        }
        config.max_backups = n;
    }
    if let Some(n) = max_write_attempts {
        if n == 0 {
            bail!("--max-write-attempts must be at least 1");
        }
        config.max_write_attempts = n;
    }
    if changed {
        paths.ensure()?;
        save_config(paths.config_file(), &config)?;
    }
    println!("data dir:           {}", paths.root().display());
    println!("debounceMs:         {}", config.debounce_ms);
    println!("maxBackups:         {}", config.max_backups);
    println!("maxWriteAttempts:   {}", config.max_write_attempts);
    Ok(())
}
