// Explicit logging context passed down from the orchestrator. Task identity
// is a field here, not global state. Two append-only sinks: a general
// activity log and a success-only log.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct RunLog {
    files: Arc<Option<LogFiles>>,
    task_id: Option<u64>,
}

struct LogFiles {
    activity: PathBuf,
    success: PathBuf,
}

impl RunLog {
    /// Create the dated log directory and both sink files under it.
    pub fn new(log_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dated = log_dir
            .as_ref()
            .join(Local::now().format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dated)?;
        Ok(Self {
            files: Arc::new(Some(LogFiles {
                activity: dated.join("activity.log"),
                success: dated.join("success.log"),
            })),
            task_id: None,
        })
    }

    /// A context with no file sinks; lines still reach `tracing`.
    pub fn discard() -> Self {
        Self {
            files: Arc::new(None),
            task_id: None,
        }
    }

    /// Task-scoped handle; every line it emits carries the task id.
    pub fn with_task_id(&self, task_id: u64) -> Self {
        Self {
            files: self.files.clone(),
            task_id: Some(task_id),
        }
    }

    pub fn info(&self, message: &str) {
        let line = self.stamp(message);
        tracing::info!("{}", message);
        println!("{line}");
        if let Some(files) = self.files.as_ref() {
            append_line(&files.activity, &line);
        }
    }

    pub fn error(&self, message: &str) {
        let line = self.stamp(message);
        tracing::error!("{}", message);
        eprintln!("{line}");
        if let Some(files) = self.files.as_ref() {
            append_line(&files.activity, &line);
        }
    }

    /// Confirmed successes land in both sinks.
    pub fn success(&self, message: &str) {
        let line = self.stamp(message);
        tracing::info!("{}", message);
        println!("{line}");
        if let Some(files) = self.files.as_ref() {
            append_line(&files.success, &line);
            append_line(&files.activity, &line);
        }
    }

    fn stamp(&self, message: &str) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        match self.task_id {
            Some(id) => format!("{timestamp}  task {id} {message}"),
            None => format!("{timestamp}  {message}"),
        }
    }
}

fn append_line(path: &Path, line: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(e) = result {
        warn!("failed to append to {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_lines_land_in_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path()).unwrap();

        log.info("probing target");
        log.success("credentials found");

        let dated = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let activity = std::fs::read_to_string(dated.join("activity.log")).unwrap();
        let success = std::fs::read_to_string(dated.join("success.log")).unwrap();

        assert!(activity.contains("probing target"));
        assert!(activity.contains("credentials found"));
        assert!(success.contains("credentials found"));
        assert!(!success.contains("probing target"));
    }

    #[test]
    fn task_id_prefixes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path()).unwrap().with_task_id(7);
        log.info("hello");

        let dated = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let activity = std::fs::read_to_string(dated.join("activity.log")).unwrap();
        assert!(activity.contains("task 7 hello"));
    }

    #[test]
    fn discard_context_swallows_output() {
        // No panic, no files
        let log = RunLog::discard().with_task_id(1);
        log.info("nowhere");
        log.success("nowhere either");
    }
}
