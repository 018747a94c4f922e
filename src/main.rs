use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use std::process;
use timerstore::{DATABASE_NAME, Notifier, Store, Task, TaskInput, TaskMode, format_timestamp, jsonl, now_ms};

#[derive(Parser)]
#[command(name = "timerstore")]
#[command(about = "timerstore CLI - local task persistence for a personal task timer")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (default: the platform's local data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task with a deadline or a duration
    Add {
        title: String,

        /// Deadline in milliseconds since the epoch
        #[arg(long, conflicts_with = "minutes", required_unless_present = "minutes")]
        target: Option<i64>,

        /// Deadline as minutes from now
        #[arg(long)]
        minutes: Option<i64>,
    },

    /// List pending tasks
    Active,

    /// List done or expired tasks, newest first
    Completed,

    /// List every task
    List,

    /// Show one task with its history
    Show { id: i64 },

    /// Mark a task as done now
    Complete { id: i64 },

    /// Change a task's title, keeping the old state in its history
    Rename { id: i64, title: String },

    /// Delete a task
    Delete { id: i64 },

    /// Import tasks from a JSON array or JSONL file
    Import { file: PathBuf },

    /// Export all tasks to a JSONL file
    Export { file: PathBuf },
}

/// Prints import results to the terminal
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        println!("{}", message.green());
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message.red().bold());
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(DATABASE_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_task(task: &Task, now: i64) {
    let status = if task.is_done() {
        "done".green()
    } else if task.is_active_at(now) {
        "active".cyan()
    } else {
        "expired".yellow()
    };

    println!(
        "{:>5}  {:<7}  {}  {}",
        task.id,
        status,
        format_timestamp(task.target_time),
        task.title
    );
}

fn print_tasks(tasks: &[Task]) {
    let now = now_ms();
    if tasks.is_empty() {
        println!("No tasks");
    }
    for task in tasks {
        print_task(task, now);
    }
}

fn deadline_from_minutes(now: i64, minutes: i64) -> Result<i64> {
    minutes
        .checked_mul(60_000)
        .and_then(|ms| now.checked_add(ms))
        .ok_or_else(|| eyre!("--minutes {} is out of range", minutes))
}

/// Import `file`, returning `None` once the notifier has reported a rejected batch
fn import_file<N: Notifier>(store: &mut Store, file: &Path, notifier: &N) -> Result<Option<usize>> {
    let inputs = jsonl::read_task_inputs(file)?;

    // The store logs the failure itself
    Ok(store.import_tasks(inputs, notifier).ok().map(|ids| ids.len()))
}

fn load_task(store: &Store, id: i64) -> Result<Task> {
    store.get_task(id)?.ok_or_else(|| eyre!("Task {} not found", id))
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store_path = cli.store_path.unwrap_or_else(default_store_path);

    // Open store
    let mut store = Store::open(&store_path)?;

    match cli.command {
        Commands::Add { title, target, minutes } => {
            let now = now_ms();
            let (target_time, mode) = match (target, minutes) {
                (Some(target), _) => (target, TaskMode::Deadline),
                (None, Some(minutes)) => (deadline_from_minutes(now, minutes)?, TaskMode::Duration),
                (None, None) => return Err(eyre!("Either --target or --minutes is required")),
            };
            let id = store.add_task(TaskInput::new(title, now, target_time, mode))?;
            println!("Added task {}", id);
        }
        Commands::Active => print_tasks(&store.query_active_tasks()?),
        Commands::Completed => print_tasks(&store.query_completed_tasks()?),
        Commands::List => print_tasks(&store.query_all_tasks()?),
        Commands::Show { id } => {
            let task = load_task(&store, id)?;
            print_task(&task, now_ms());
            println!("       created {}", format_timestamp(task.created_time));
            println!("       updated {}", format_timestamp(task.updated_time));
            for entry in &task.histories {
                println!("       [{}] {} (target {})", entry.record_time, entry.title, entry.target_time);
            }
        }
        Commands::Complete { id } => {
            let now = now_ms();
            let task = load_task(&store, id)?;
            store.update_task(id, TaskInput::from(task).done_at(now).updated_at(now))?;
            println!("Completed task {}", id);
        }
        Commands::Rename { id, title } => {
            let now = now_ms();
            let mut task = load_task(&store, id)?;
            task.record_history(now);
            task.title = title;
            task.updated_time = now;
            store.update_task(id, TaskInput::from(task))?;
            println!("Renamed task {}", id);
        }
        Commands::Delete { id } => {
            store.delete_task(id)?;
            println!("Deleted task {}", id);
        }
        Commands::Import { file } => {
            match import_file(&mut store, &file, &ConsoleNotifier)? {
                Some(count) => println!("Imported {} tasks", count),
                None => process::exit(1),
            }
        }
        Commands::Export { file } => {
            let count = store.export_tasks(&file)?;
            println!("Exported {} tasks to {}", count, file.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingNotifier {
        successes: Cell<usize>,
        errors: Cell<usize>,
    }

    impl Notifier for CountingNotifier {
        fn success(&self, _message: &str) {
            self.successes.set(self.successes.get() + 1);
        }

        fn error(&self, _message: &str) {
            self.errors.set(self.errors.get() + 1);
        }
    }

    const IMPORT_FILE: &str = r#"[
  {"title":"Task X","createdTime":1000,"targetTime":5000,"mode":"1"},
  {"title":"Task Y","createdTime":1000,"targetTime":6000,"mode":"2"}
]"#;

    #[test]
    fn test_deadline_from_minutes() {
        assert_eq!(deadline_from_minutes(1000, 2).unwrap(), 121_000);
        assert!(deadline_from_minutes(1000, i64::MAX / 1000).is_err());
        assert!(deadline_from_minutes(i64::MAX - 10, 1).is_err());
    }

    #[test]
    fn test_import_file_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, IMPORT_FILE).unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let notifier = CountingNotifier::default();

        assert_eq!(import_file(&mut store, &path, &notifier).unwrap(), Some(2));
        assert_eq!(notifier.successes.get(), 1);
        assert_eq!(notifier.errors.get(), 0);
    }

    #[test]
    fn test_import_file_rejected_batch_reports_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, IMPORT_FILE).unwrap();

        let mut store = Store::open_in_memory().unwrap();
        store
            .db()
            .execute_batch(
                "CREATE TEMP TRIGGER reject_title BEFORE INSERT ON tasks
                 WHEN NEW.title = 'Task Y'
                 BEGIN SELECT RAISE(ABORT, 'write rejected'); END;",
            )
            .unwrap();
        let notifier = CountingNotifier::default();

        // Not an error for main to print again; the notifier already reported it
        assert_eq!(import_file(&mut store, &path, &notifier).unwrap(), None);
        assert_eq!(notifier.errors.get(), 1);
        assert_eq!(notifier.successes.get(), 0);
        assert!(store.query_all_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_import_file_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open_in_memory().unwrap();
        let notifier = CountingNotifier::default();

        assert!(import_file(&mut store, &temp.path().join("missing.json"), &notifier).is_err());
        assert_eq!(notifier.errors.get() + notifier.successes.get(), 0);
    }
}
