//! App log - Shared append-only log file with console echo

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Prefix carried by every line the supervisor writes
pub const LOG_PREFIX: &str = "STARTUP CONTROLLER";

/// Destination for operator-facing log lines
pub trait LogSink: Send + Sync {
    /// Append `line` tagged with `tags` (usually the app name first)
    fn append(&self, line: &str, tags: &[&str]);
}

/// Render a line as `[STARTUP CONTROLLER] [tag]... line`
pub fn render(line: &str, tags: &[&str]) -> String {
    let mut text = format!("[{}] ", LOG_PREFIX);
    for tag in tags {
        text.push('[');
        text.push_str(tag);
        text.push_str("] ");
    }
    text.push_str(line);
    text
}

/// Appends timestamped lines to a file and echoes them to the console.
///
/// File errors are ignored so a full disk or a missing directory never
/// stops supervision.
pub struct FileLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = Local::now().format("%d/%m/%y %H:%M:%S");
        writeln!(file, "[{}] {}", stamp, text)
    }
}

impl LogSink for FileLog {
    fn append(&self, line: &str, tags: &[&str]) {
        let text = render(line, tags);
        {
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = self.write_line(&text);
        }
        tracing::info!(target: "startupctl::app", "{}", text);
    }
}

/// Keeps lines in memory, for tests
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<(String, Vec<String>)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every appended line with its tags, oldest first
    pub fn lines(&self) -> Vec<(String, Vec<String>)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Whether any line tagged `tag` contains `fragment`
    pub fn contains(&self, tag: &str, fragment: &str) -> bool {
        self.lines()
            .iter()
            .any(|(line, tags)| tags.iter().any(|t| t == tag) && line.contains(fragment))
    }

    pub fn count(&self, tag: &str, fragment: &str) -> usize {
        self.lines()
            .iter()
            .filter(|(line, tags)| tags.iter().any(|t| t == tag) && line.contains(fragment))
            .count()
    }
}

impl LogSink for MemoryLog {
    fn append(&self, line: &str, tags: &[&str]) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((
                line.to_string(),
                tags.iter().map(|t| t.to_string()).collect(),
            ));
        }
    }
}
