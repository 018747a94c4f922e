// Import and export files: JSON arrays or one task per line

use eyre::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::task::{Task, TaskInput};

/// Read task inputs from an import file
///
/// A file starting with `[` is a JSON array and must parse as a whole.
/// Anything else is read as JSONL, where blank lines are ignored and lines
/// that are not UTF-8 or fail to parse are logged and skipped.
pub fn read_task_inputs(path: &Path) -> Result<Vec<TaskInput>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read import file {:?}", path))?;

    if bytes.trim_ascii_start().starts_with(b"[") {
        let inputs: Vec<TaskInput> =
            serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse JSON array in {:?}", path))?;
        info!(file = ?path, count = inputs.len(), "Loaded tasks from JSON array");
        return Ok(inputs);
    }

    let mut inputs = Vec::new();

    for (line_num, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(raw) {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TaskInput>(line) {
            Ok(input) => inputs.push(input),
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
            }
        }
    }

    info!(file = ?path, count = inputs.len(), "Loaded tasks from JSONL");

    Ok(inputs)
}

/// Replace `path` with one JSON object per task
pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<usize> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .context("Failed to open export file")?;

    // Truncate only once we hold the lock
    file.lock_exclusive().context("Failed to acquire file lock")?;
    file.set_len(0)?;

    let mut writer = BufWriter::new(&file);
    for task in tasks {
        let json = serde_json::to_string(task)?;
        writeln!(writer, "{}", json)?;
    }
    writer.flush()?;
    drop(writer);

    file.sync_all()?; // Lock is released when file is dropped

    info!(file = ?path, count = tasks.len(), "Exported tasks");
    Ok(tasks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskMode;
    use tempfile::TempDir;

    #[test]
    fn test_read_json_array() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(
            &path,
            r#"[
  {"id":1,"title":"First","createdTime":1000,"targetTime":5000,"mode":"1"},
  {"id":2,"title":"Second","createdTime":1000,"targetTime":6000,"doneTime":5500,"mode":"2","histories":[]}
]"#,
        )
        .unwrap();

        let inputs = read_task_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].title, "First");
        assert_eq!(inputs[0].done_time, None);
        assert_eq!(inputs[1].done_time, Some(5500));
        assert_eq!(inputs[1].mode, TaskMode::Duration);
    }

    #[test]
    fn test_read_json_array_malformed_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, r#"[{"title":"Broken""#).unwrap();

        assert!(read_task_inputs(&path).is_err());
    }

    #[test]
    fn test_read_jsonl_malformed_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.jsonl");

        // Valid record, malformed line, blank line, then another valid record
        fs::write(
            &path,
            r#"{"title":"Valid","createdTime":1000,"targetTime":5000,"mode":"1"}
{malformed json}

{"title":"Also Valid","createdTime":1000,"targetTime":7000,"mode":"2"}
"#,
        )
        .unwrap();

        let inputs = read_task_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].title, "Valid");
        assert_eq!(inputs[1].title, "Also Valid");
    }

    #[test]
    fn test_read_jsonl_skips_non_utf8_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.jsonl");

        let mut content = Vec::new();
        content.extend_from_slice(br#"{"title":"Before","createdTime":1000,"targetTime":5000,"mode":"1"}"#);
        content.extend_from_slice(b"\n\xff\xfe garbage\n");
        content.extend_from_slice(br#"{"title":"After","createdTime":1000,"targetTime":6000,"mode":"2"}"#);
        content.extend_from_slice(b"\r\n");
        fs::write(&path, content).unwrap();

        let inputs = read_task_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].title, "Before");
        assert_eq!(inputs[1].title, "After");
    }

    #[test]
    fn test_read_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_task_inputs(&temp.path().join("missing.jsonl")).is_err());
    }

    #[test]
    fn test_write_tasks_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.jsonl");
        fs::write(&path, "stale content that is longer than the export\n".repeat(10)).unwrap();

        let tasks = vec![
            TaskInput::new("One", 1, 10, TaskMode::Deadline).into_task(1),
            TaskInput::new("Two", 2, 20, TaskMode::Duration).into_task(2),
        ];
        let count = write_tasks(&path, &tasks).unwrap();
        assert_eq!(count, 2);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!content.contains("stale"));
        assert!(content.contains("\"title\":\"One\""));

        // Exported lines read back as import input
        let inputs = read_task_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].target_time, 20);
    }
}
