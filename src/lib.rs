// timerstore - Local task persistence for a personal task timer (SQLite + JSONL)

pub mod filter;
pub mod jsonl;
pub mod notify;
pub mod store;
pub mod task;

// Re-export main types for convenience
pub use filter::{Filter, FilterOp, IndexField, IndexValue, Order, Predicate};
pub use notify::{Notifier, TracingNotifier};
pub use store::{DATABASE_NAME, SCHEMA_VERSION, Store, now_ms};
pub use task::{HistoryEntry, Task, TaskInput, TaskMode, format_timestamp};
