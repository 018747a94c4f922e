// Task records and the input type that fills their defaults

use chrono::{Local, TimeZone};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// Format used for every time field of a history entry
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a task's deadline was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskMode {
    /// Created by picking a deadline
    #[serde(rename = "1")]
    Deadline,
    /// Created by picking a duration from now
    #[serde(rename = "2")]
    Duration,
}

impl TaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskMode::Deadline => "1",
            TaskMode::Duration => "2",
        }
    }
}

impl std::fmt::Display for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1" | "deadline" => Ok(TaskMode::Deadline),
            "2" | "duration" => Ok(TaskMode::Duration),
            other => Err(eyre!("Invalid task mode: {} (expected 1/deadline or 2/duration)", other)),
        }
    }
}

/// Snapshot of a task's earlier state, recorded on edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub title: String,
    pub created_time: String,
    pub updated_time: String,
    pub target_time: String,
    pub mode: TaskMode,
    pub record_time: String,
}

/// A persisted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub created_time: i64,
    pub updated_time: i64,
    pub target_time: i64,
    /// Completion time, 0 while not done
    pub done_time: i64,
    #[serde(default)]
    pub histories: Vec<HistoryEntry>,
    pub mode: TaskMode,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.done_time != 0
    }

    /// Active at `now`: deadline still ahead and not marked done
    pub fn is_active_at(&self, now: i64) -> bool {
        self.target_time > now && self.done_time == 0
    }

    /// Snapshot of the current state, stamped with `record_time`
    pub fn snapshot(&self, record_time: i64) -> HistoryEntry {
        HistoryEntry {
            title: self.title.clone(),
            created_time: format_timestamp(self.created_time),
            updated_time: format_timestamp(self.updated_time),
            target_time: format_timestamp(self.target_time),
            mode: self.mode,
            record_time: format_timestamp(record_time),
        }
    }

    /// Append a snapshot of the current state to `histories`
    pub fn record_history(&mut self, now: i64) {
        let entry = self.snapshot(now);
        self.histories.push(entry);
    }
}

/// Task fields as supplied by a caller or an import file
///
/// Any `id` in the source data is ignored; ids belong to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub title: String,
    pub created_time: i64,
    #[serde(default)]
    pub updated_time: Option<i64>,
    pub target_time: i64,
    #[serde(default)]
    pub done_time: Option<i64>,
    #[serde(default)]
    pub histories: Option<Vec<HistoryEntry>>,
    pub mode: TaskMode,
}

impl TaskInput {
    pub fn new(title: impl Into<String>, created_time: i64, target_time: i64, mode: TaskMode) -> Self {
        Self {
            title: title.into(),
            created_time,
            updated_time: None,
            target_time,
            done_time: None,
            histories: None,
            mode,
        }
    }

    pub fn done_at(mut self, done_time: i64) -> Self {
        self.done_time = Some(done_time);
        self
    }

    pub fn updated_at(mut self, updated_time: i64) -> Self {
        self.updated_time = Some(updated_time);
        self
    }

    pub fn with_histories(mut self, histories: Vec<HistoryEntry>) -> Self {
        self.histories = Some(histories);
        self
    }

    /// Build the full record, filling every omitted field with its default
    pub fn into_task(self, id: i64) -> Task {
        Task {
            id,
            title: self.title,
            created_time: self.created_time,
            updated_time: self.updated_time.unwrap_or(self.created_time),
            target_time: self.target_time,
            done_time: self.done_time.unwrap_or(0),
            histories: self.histories.unwrap_or_default(),
            mode: self.mode,
        }
    }
}

impl From<Task> for TaskInput {
    fn from(task: Task) -> Self {
        Self {
            title: task.title,
            created_time: task.created_time,
            updated_time: Some(task.updated_time),
            target_time: task.target_time,
            done_time: Some(task.done_time),
            histories: Some(task.histories),
            mode: task.mode,
        }
    }
}

/// Render epoch milliseconds as local `YYYY-MM-DD HH:mm:ss`
pub fn format_timestamp(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format(HISTORY_TIME_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&TaskMode::Deadline).unwrap(), "\"1\"");
        assert_eq!(serde_json::to_string(&TaskMode::Duration).unwrap(), "\"2\"");

        let mode: TaskMode = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(mode, TaskMode::Duration);
        assert!(serde_json::from_str::<TaskMode>("\"3\"").is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("1".parse::<TaskMode>().unwrap(), TaskMode::Deadline);
        assert_eq!("duration".parse::<TaskMode>().unwrap(), TaskMode::Duration);
        assert!("weekly".parse::<TaskMode>().is_err());
    }

    #[test]
    fn test_into_task_fills_defaults() {
        let task = TaskInput::new("Write report", 1000, 5000, TaskMode::Deadline).into_task(7);

        assert_eq!(task.id, 7);
        assert_eq!(task.done_time, 0);
        assert_eq!(task.updated_time, 1000);
        assert!(task.histories.is_empty());
        assert!(task.is_active_at(2000));
        assert!(!task.is_active_at(5000));
    }

    #[test]
    fn test_into_task_keeps_supplied_fields() {
        let task = TaskInput::new("Write report", 1000, 5000, TaskMode::Duration)
            .updated_at(1500)
            .done_at(3000)
            .into_task(1);

        assert_eq!(task.updated_time, 1500);
        assert_eq!(task.done_time, 3000);
        assert!(task.is_done());
        assert!(!task.is_active_at(2000));
    }

    #[test]
    fn test_input_deserialization_ignores_id() {
        let json = r#"{"id":42,"title":"Imported","createdTime":1000,"targetTime":9000,"mode":"1"}"#;
        let input: TaskInput = serde_json::from_str(json).unwrap();

        assert_eq!(input.title, "Imported");
        assert_eq!(input.done_time, None);
        assert_eq!(input.histories, None);
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = TaskInput::new("Read", 1, 2, TaskMode::Deadline).into_task(3);
        let json = serde_json::to_string(&task).unwrap();

        assert!(json.contains("\"createdTime\":1"));
        assert!(json.contains("\"doneTime\":0"));
        assert!(json.contains("\"mode\":\"1\""));
    }

    #[test]
    fn test_record_history_snapshots_current_state() {
        let mut task = TaskInput::new("Draft", 1000, 5000, TaskMode::Deadline).into_task(1);
        task.record_history(2000);
        task.title = "Final".to_string();

        assert_eq!(task.histories.len(), 1);
        let entry = &task.histories[0];
        assert_eq!(entry.title, "Draft");
        assert_eq!(entry.mode, TaskMode::Deadline);
        assert_eq!(entry.record_time, format_timestamp(2000));
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1_568_000_000_000);
        assert_eq!(formatted.len(), 19);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }

    #[test]
    fn test_into_task_keeps_long_title_and_pre_epoch_times() {
        let title = "x".repeat(2000);
        let task = TaskInput::new(title.clone(), -86_400_000, -1000, TaskMode::Deadline).into_task(1);

        assert_eq!(task.title, title);
        assert_eq!(task.created_time, -86_400_000);
        assert_eq!(task.target_time, -1000);
        assert_eq!(format_timestamp(-86_400_000).len(), 19);
    }
}
