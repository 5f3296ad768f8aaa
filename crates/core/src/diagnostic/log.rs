//! Log entries and the final-state reduction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Test state. Only `Running` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Running,
    Success,
    Warning,
    Error,
}

impl TestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Running => "running",
            TestState::Success => "success",
            TestState::Warning => "warning",
            TestState::Error => "error",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the terminal state from an ordered log.
///
/// Success needs at least one success entry and no warnings or errors.
/// Warnings without errors give `Warning`. Anything else, including an
/// empty log, is an `Error`.
pub fn reduce_state(entries: &[LogEntry]) -> TestState {
    let count = |level: LogLevel| entries.iter().filter(|e| e.level == level).count();
    let (success, warning, error) = (
        count(LogLevel::Success),
        count(LogLevel::Warning),
        count(LogLevel::Error),
    );

    if error == 0 && warning == 0 && success > 0 {
        TestState::Success
    } else if error == 0 && warning > 0 {
        TestState::Warning
    } else {
        TestState::Error
    }
}
