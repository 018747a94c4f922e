// Task store on SQLite: typed CRUD, indexed queries, transactional import

use crate::filter::{FilterOp, IndexField, Order, Predicate};
use crate::jsonl;
use crate::notify::{IMPORT_FAILURE_MESSAGE, IMPORT_SUCCESS_MESSAGE, Notifier};
use crate::task::{HistoryEntry, Task, TaskInput, TaskMode};
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Name of the local database
pub const DATABASE_NAME: &str = "timer";

/// Schema version written to `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

const STORE_DIR: &str = ".timer";

const TASK_COLUMNS: &str =
    "t.id, t.title, t.created_time, t.updated_time, t.target_time, t.done_time, t.mode, t.histories_json";

/// Handle on the `tasks` collection
///
/// One `Store` owns one connection. Create it at startup and pass it to
/// whatever needs it; tests use [`Store::open_in_memory`] for isolation.
pub struct Store {
    base_path: Option<PathBuf>,
    db: Connection,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The database lives in a `.timer` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(STORE_DIR);

        // Create directory if it doesn't exist
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join(format!("{}.db", DATABASE_NAME));
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let store = Self::init(db, Some(base_path))?;
        store.create_gitignore()?;
        store.write_version()?;

        info!(path = ?db_path, "Opened task store");
        Ok(store)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::init(db, None)
    }

    fn init(db: Connection, base_path: Option<PathBuf>) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;

        let store = Self { base_path, db };
        store.check_schema_version()?;
        store.create_schema()?;

        Ok(store)
    }

    /// Directory holding the database, `None` for in-memory stores
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Get a reference to the SQLite database connection
    pub fn db(&self) -> &Connection {
        &self.db
    }

    fn check_schema_version(&self) -> Result<()> {
        let version: i64 = self.db.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(eyre!(
                "Database schema version {} is newer than supported version {}",
                version,
                SCHEMA_VERSION
            ));
        }

        if version < SCHEMA_VERSION {
            debug!(from = version, to = SCHEMA_VERSION, "Setting schema version");
            self.db
                .execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        }

        Ok(())
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                created_time INTEGER NOT NULL,
                updated_time INTEGER NOT NULL,
                target_time INTEGER NOT NULL,
                done_time INTEGER NOT NULL DEFAULT 0,
                mode TEXT NOT NULL CHECK (mode IN ('1', '2')),
                histories_json TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_title ON tasks(title);
            CREATE INDEX IF NOT EXISTS idx_tasks_created_time ON tasks(created_time);
            CREATE INDEX IF NOT EXISTS idx_tasks_updated_time ON tasks(updated_time);
            CREATE INDEX IF NOT EXISTS idx_tasks_target_time ON tasks(target_time);
            CREATE INDEX IF NOT EXISTS idx_tasks_done_time ON tasks(done_time);
            CREATE INDEX IF NOT EXISTS idx_tasks_mode ON tasks(mode);

            -- Multi-entry index: one row per history entry
            CREATE TABLE IF NOT EXISTS task_history_index (
                task_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                title TEXT NOT NULL,
                record_time TEXT NOT NULL,
                PRIMARY KEY (task_id, position),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_task_history_title ON task_history_index(title);
            CREATE INDEX IF NOT EXISTS idx_task_history_record_time ON task_history_index(record_time);
            "#,
        )?;

        Ok(())
    }

    /// Create .gitignore file
    fn create_gitignore(&self) -> Result<()> {
        let Some(base_path) = &self.base_path else {
            return Ok(());
        };

        let gitignore_path = base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "timer.db\ntimer.db-shm\ntimer.db-wal\ntimer.db-journal\n")?;
        }
        Ok(())
    }

    /// Write version file
    fn write_version(&self) -> Result<()> {
        let Some(base_path) = &self.base_path else {
            return Ok(());
        };

        let version_path = base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, SCHEMA_VERSION.to_string())?;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Tasks still pending right now
    pub fn query_active_tasks(&self) -> Result<Vec<Task>> {
        self.query_active_tasks_at(now_ms())
    }

    /// Tasks with `targetTime > now` and `doneTime == 0`, ascending by id
    pub fn query_active_tasks_at(&self, now: i64) -> Result<Vec<Task>> {
        let predicate = Predicate::field(IndexField::TargetTime, FilterOp::Gt, now)
            .and(Predicate::field(IndexField::DoneTime, FilterOp::Eq, 0_i64));
        self.query(&predicate, Order::Ascending)
    }

    /// Tasks done or expired as of right now
    pub fn query_completed_tasks(&self) -> Result<Vec<Task>> {
        self.query_completed_tasks_at(now_ms())
    }

    /// Tasks with `targetTime < now` or `doneTime != 0`, newest id first
    pub fn query_completed_tasks_at(&self, now: i64) -> Result<Vec<Task>> {
        let predicate = Predicate::field(IndexField::TargetTime, FilterOp::Lt, now)
            .or(Predicate::field(IndexField::DoneTime, FilterOp::Ne, 0_i64));
        self.query(&predicate, Order::Descending)
    }

    /// Every well-formed task (`targetTime > 0`), ascending by id
    pub fn query_all_tasks(&self) -> Result<Vec<Task>> {
        let predicate = Predicate::field(IndexField::TargetTime, FilterOp::Gt, 0_i64);
        self.query(&predicate, Order::Ascending)
    }

    /// Tasks matching `predicate`, sorted by id
    pub fn query(&self, predicate: &Predicate, order: Order) -> Result<Vec<Task>> {
        let mut params = Vec::new();
        let condition = predicate.to_sql(&mut params);
        let sql = format!(
            "SELECT {} FROM tasks t WHERE {} ORDER BY t.id {}",
            TASK_COLUMNS,
            condition,
            order.to_sql()
        );
        debug!(%sql, param_count = params.len(), "query: compiled");

        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), TaskRow::from_row)?;

        let mut results = Vec::new();
        for row_result in rows {
            results.push(row_result?.into_task()?);
        }

        Ok(results)
    }

    /// Get a task by id
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS);

        let row = self
            .db
            .query_row(&sql, [id], TaskRow::from_row)
            .optional()?;

        row.map(TaskRow::into_task).transpose()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a new task and return the id the store assigned
    pub fn add_task(&mut self, input: TaskInput) -> Result<i64> {
        let tx = self.db.transaction()?;
        let id = Self::write_task_tx(&tx, None, input)?;
        tx.commit()?;

        debug!(id, "add_task: inserted");
        Ok(id)
    }

    /// Replace the task stored under `id`, creating it if absent
    pub fn update_task(&mut self, id: i64, input: TaskInput) -> Result<()> {
        Self::validate_id(id)?;

        let tx = self.db.transaction()?;
        Self::write_task_tx(&tx, Some(id), input)?;
        tx.commit()?;

        debug!(id, "update_task: stored");
        Ok(())
    }

    /// Remove a task; unknown ids are ignored
    pub fn delete_task(&mut self, id: i64) -> Result<()> {
        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM task_history_index WHERE task_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        tx.commit()?;

        debug!(id, removed, "delete_task: done");
        Ok(())
    }

    /// Insert every task in one transaction
    ///
    /// Either all tasks are stored or none are. `notifier` hears exactly one
    /// message: success after commit, or a generic failure. The failure is
    /// also logged and returned.
    pub fn import_tasks<N: Notifier + ?Sized>(&mut self, tasks: Vec<TaskInput>, notifier: &N) -> Result<Vec<i64>> {
        let count = tasks.len();

        match self.insert_all(tasks) {
            Ok(ids) => {
                info!(count, "Imported tasks");
                notifier.success(IMPORT_SUCCESS_MESSAGE);
                Ok(ids)
            }
            Err(e) => {
                error!(count, error = ?e, "Import failed, nothing was stored");
                notifier.error(IMPORT_FAILURE_MESSAGE);
                Err(e)
            }
        }
    }

    /// Write every well-formed task to a JSONL file, returning the count
    pub fn export_tasks(&self, path: &Path) -> Result<usize> {
        let tasks = self.query_all_tasks()?;
        jsonl::write_tasks(path, &tasks)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn insert_all(&mut self, tasks: Vec<TaskInput>) -> Result<Vec<i64>> {
        let tx = self.db.transaction()?;
        let mut ids = Vec::with_capacity(tasks.len());

        for (index, input) in tasks.into_iter().enumerate() {
            let id = Self::write_task_tx(&tx, None, input)
                .with_context(|| format!("Failed to import task #{}", index + 1))?;
            ids.push(id);
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;
        Ok(ids)
    }

    /// Store one task; `None` lets SQLite assign the id
    fn write_task_tx(tx: &Transaction, id: Option<i64>, input: TaskInput) -> Result<i64> {
        // The placeholder id is never written for inserts
        let task = input.into_task(id.unwrap_or_default());

        let histories_json = serde_json::to_string(&task.histories).context("Failed to serialize histories")?;

        let id = match id {
            None => {
                tx.execute(
                    "INSERT INTO tasks (title, created_time, updated_time, target_time, done_time, mode, histories_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        task.title,
                        task.created_time,
                        task.updated_time,
                        task.target_time,
                        task.done_time,
                        task.mode.as_str(),
                        histories_json
                    ],
                )?;
                tx.last_insert_rowid()
            }
            Some(id) => {
                tx.execute(
                    "INSERT INTO tasks (id, title, created_time, updated_time, target_time, done_time, mode, histories_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        target_time = excluded.target_time,
                        done_time = excluded.done_time,
                        mode = excluded.mode,
                        histories_json = excluded.histories_json",
                    rusqlite::params![
                        id,
                        task.title,
                        task.created_time,
                        task.updated_time,
                        task.target_time,
                        task.done_time,
                        task.mode.as_str(),
                        histories_json
                    ],
                )?;
                id
            }
        };

        Self::update_history_index_tx(tx, id, &task.histories)?;
        Ok(id)
    }

    fn update_history_index_tx(tx: &Transaction, task_id: i64, histories: &[HistoryEntry]) -> Result<()> {
        debug!(task_id, entry_count = histories.len(), "update_history_index_tx: called");

        tx.execute("DELETE FROM task_history_index WHERE task_id = ?1", [task_id])?;

        for (position, entry) in histories.iter().enumerate() {
            tx.execute(
                "INSERT INTO task_history_index (task_id, position, title, record_time)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![task_id, position as i64, entry.title, entry.record_time],
            )?;
        }

        Ok(())
    }

    fn validate_id(id: i64) -> Result<()> {
        if id <= 0 {
            return Err(eyre!("Invalid task id: {} (must be positive)", id));
        }
        Ok(())
    }
}

/// Raw columns of one `tasks` row
struct TaskRow {
    id: i64,
    title: String,
    created_time: i64,
    updated_time: i64,
    target_time: i64,
    done_time: i64,
    mode: String,
    histories_json: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            created_time: row.get(2)?,
            updated_time: row.get(3)?,
            target_time: row.get(4)?,
            done_time: row.get(5)?,
            mode: row.get(6)?,
            histories_json: row.get(7)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let mode: TaskMode = self.mode.parse()?;
        let histories: Vec<HistoryEntry> = serde_json::from_str(&self.histories_json)
            .with_context(|| format!("Failed to deserialize histories of task {}", self.id))?;

        Ok(Task {
            id: self.id,
            title: self.title,
            created_time: self.created_time,
            updated_time: self.updated_time,
            target_time: self.target_time,
            done_time: self.done_time,
            histories,
            mode,
        })
    }
}

/// Current time in milliseconds since the epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
