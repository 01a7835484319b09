//! Logging sink the core reports through. Sink failures are swallowed here
//! and never reach the resolution/restore pipeline.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::LOG_FILE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Status,
    TaskSummary,
    Error,
}

pub trait Logger: Send + Sync {
    fn log(&self, message: &str, level: LogLevel);
}

/// Discards everything. Used by tests and embedders that render results
/// themselves.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &str, _level: LogLevel) {}
}

/// Appends timestamped lines to logs.txt under the cache root and echoes to
/// the terminal unless quieted. Every I/O failure in here is deliberately
/// dropped.
pub struct FileLogger {
    path: PathBuf,
}

impl FileLogger {
    pub fn new(cache_root: &Path) -> Self {
        Self { path: cache_root.join(LOG_FILE) }
    }
}

fn is_quiet() -> bool {
    if env::var("LIMAN_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    env::var("LIMAN_LOG")
        .map(|v| v.to_lowercase() == "quiet" || v.to_lowercase() == "error")
        .unwrap_or(false)
}

impl Logger for FileLogger {
    fn log(&self, message: &str, level: LogLevel) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {}", timestamp, message);

        match level {
            LogLevel::Error => eprintln!("{}", line),
            _ => {
                if !is_quiet() {
                    println!("{}", line);
                }
            }
        }

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}
