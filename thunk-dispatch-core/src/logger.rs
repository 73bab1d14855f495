//! Record logging with pattern-based filtering and in-memory storage
//!
//! Filters use glob patterns over record types (`user/*`, `*/error`).
//! Matching records go to `tracing` and, optionally, to a ring buffer.
//!
//! # Example
//!
//! ```
//! use thunk_dispatch_core::logger::{ActionLogConfig, ActionLoggerConfig, ActionLoggerMiddleware};
//!
//! // Only errors, excluding a noisy poller
//! let filter = ActionLoggerConfig::new(Some("*/error"), Some("poll/*"));
//! assert!(filter.should_log("user/error"));
//! assert!(!filter.should_log("poll/error"));
//!
//! let middleware = ActionLoggerMiddleware::with_log(ActionLogConfig::new(50, filter));
//! assert!(middleware.log().unwrap().is_empty());
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use crate::action::ActionRecord;
use crate::store::Middleware;

/// Patterns excluded when no exclude list is given
const DEFAULT_EXCLUDES: &[&str] = &["@@*"];

/// Configuration for record logging with glob pattern filtering.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
#[derive(Debug, Clone)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log record types matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude record types matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl Default for ActionLoggerConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            // Bootstrap records like @@INIT
            exclude_patterns: default_excludes(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect()
}

fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

impl ActionLoggerConfig {
    /// Create a new config from comma-separated pattern strings
    ///
    /// # Arguments
    /// - `include`: comma-separated glob patterns (or None for all)
    /// - `exclude`: comma-separated glob patterns (or None for default excludes)
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_else(default_excludes),
        }
    }

    /// Create a config with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Check if a record type should be logged based on include/exclude patterns
    pub fn should_log(&self, kind: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| glob_match(p, kind))
        {
            return false;
        }

        !self.exclude_patterns.iter().any(|p| glob_match(p, kind))
    }
}

/// An entry in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    /// Record type
    pub kind: String,
    /// Whether the record was an error event
    pub error: bool,
    /// JSON rendering of the record
    pub summary: String,
    /// Timestamp when the record was logged
    pub timestamp: Instant,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Whether the record changed state (set after the reducer runs)
    pub state_changed: Option<bool>,
}

impl ActionLogEntry {
    pub fn new(record: &ActionRecord, sequence: u64) -> Self {
        Self {
            kind: record.kind.clone(),
            error: record.error,
            summary: record.summary(),
            timestamp: Instant::now(),
            sequence,
            state_changed: None,
        }
    }

    /// Time since this record was logged
    pub fn elapsed(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: ActionLoggerConfig,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
        }
    }
}

impl ActionLogConfig {
    /// Create with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Create with custom capacity and filter
    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self { capacity, filter }
    }
}

/// In-memory ring buffer of recent records
///
/// Older entries are discarded when capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Log a record (if it passes the filter)
    ///
    /// Returns the entry if it was logged, None if filtered out.
    pub fn log(&mut self, record: &ActionRecord) -> Option<&ActionLogEntry> {
        if self.config.capacity == 0 || !self.config.filter.should_log(&record.kind) {
            return None;
        }

        let entry = ActionLogEntry::new(record, self.next_sequence);
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Update the last entry with state_changed info (called after reducer)
    pub fn update_last_state_changed(&mut self, changed: bool) {
        if let Some(entry) = self.entries.back_mut() {
            entry.state_changed = Some(changed);
        }
    }

    /// Get all entries (oldest first)
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// Get the most recent N entries (newest first)
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &ActionLogConfig {
        &self.config
    }
}

/// Middleware that logs records with configurable pattern filtering.
///
/// Supports two modes:
/// - **Tracing only** (default): logs via `tracing::debug!()`
/// - **With storage**: also keeps an [`ActionLog`] ring buffer
#[derive(Debug, Clone)]
pub struct ActionLoggerMiddleware {
    config: ActionLoggerConfig,
    log: Option<ActionLog>,
    /// Whether the last record was logged (for state_changed updates)
    last_logged: bool,
    active: bool,
}

impl Default for ActionLoggerMiddleware {
    fn default() -> Self {
        Self::new(ActionLoggerConfig::default())
    }
}

impl ActionLoggerMiddleware {
    /// Tracing only, no in-memory storage
    pub fn new(config: ActionLoggerConfig) -> Self {
        Self {
            config,
            log: None,
            last_logged: false,
            active: true,
        }
    }

    /// Tracing plus in-memory storage
    pub fn with_log(config: ActionLogConfig) -> Self {
        Self {
            config: config.filter.clone(),
            log: Some(ActionLog::new(config)),
            last_logged: false,
            active: true,
        }
    }

    pub fn with_default_log() -> Self {
        Self::with_log(ActionLogConfig::default())
    }

    /// Log every record, tracing only
    pub fn log_all() -> Self {
        Self::new(ActionLoggerConfig::with_patterns(vec![], vec![]))
    }

    /// Set whether the middleware is active.
    ///
    /// When inactive, all hooks are no-ops.
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn log(&self) -> Option<&ActionLog> {
        self.log.as_ref()
    }

    pub fn log_mut(&mut self) -> Option<&mut ActionLog> {
        self.log.as_mut()
    }

    pub fn config(&self) -> &ActionLoggerConfig {
        &self.config
    }
}

impl Middleware for ActionLoggerMiddleware {
    fn before(&mut self, record: &ActionRecord) {
        if !self.active {
            return;
        }

        if self.config.should_log(&record.kind) {
            if record.error {
                tracing::warn!(action = %record.kind, payload = %record.payload, "error event");
            } else {
                tracing::debug!(action = %record.kind, "action");
            }
        }

        self.last_logged = false;
        if let Some(ref mut log) = self.log {
            if log.log(record).is_some() {
                self.last_logged = true;
            }
        }
    }

    fn after(&mut self, _record: &ActionRecord, state_changed: bool) {
        if !self.active {
            return;
        }

        if self.last_logged {
            if let Some(ref mut log) = self.log {
                log.update_last_state_changed(state_changed);
            }
        }
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star_pi = None;
    let mut star_ti = 0;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(spi) = star_pi {
            pi = spi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }

    pi == pattern.len()
}
