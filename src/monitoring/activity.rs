//! Activity Log
//!
//! Keeps the recent user-facing history of operations (started, finished,
//! failed) so front-ends can display it. Entries are also forwarded to the
//! `log` facade.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use log::{error, info};
use serde::Serialize;

/// Default number of entries retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Severity of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single recorded message.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Bounded, shareable log of recent activity.
///
/// Cloning is cheap; clones share the same buffer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<ActivityEntry>>>,
    capacity: usize,
}

impl ActivityLog {
    /// Creates a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ActivityEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an entry, evicting the oldest when full.
    pub fn push(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Info => info!("{}", message),
            Level::Error => error!("{}", message),
        }

        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            level,
            message,
            timestamp: Local::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    /// Returns up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ActivityEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Same as [`recent`](Self::recent), formatted as `[LEVEL] message`.
    pub fn recent_lines(&self, n: usize) -> Vec<String> {
        self.recent(n).iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_format() {
        let log = ActivityLog::default();
        log.info("Creating environment 'ml'");
        log.error("Create failed: boom");

        assert_eq!(
            log.recent_lines(10),
            vec!["[INFO] Creating environment 'ml'", "[ERROR] Create failed: boom"]
        );
    }

    #[test]
    fn test_recent_returns_tail() {
        let log = ActivityLog::default();
        for i in 0..150 {
            log.info(format!("entry {}", i));
        }

        let recent = log.recent(100);
        assert_eq!(recent.len(), 100);
        assert_eq!(recent[0].message, "entry 50");
        assert_eq!(recent[99].message, "entry 149");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = ActivityLog::new(3);
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }

        assert_eq!(log.len(), 3);
        let lines = log.recent_lines(10);
        assert_eq!(lines[0], "[INFO] entry 2");
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = ActivityLog::default();
        let other = log.clone();
        other.error("shared");

        assert!(!log.is_empty());
        assert_eq!(log.recent(1)[0].level, Level::Error);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let log = ActivityLog::new(0);
        log.info("kept");
        assert_eq!(log.len(), 1);
    }
}
