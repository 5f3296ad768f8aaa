//! Diagnostic test lifecycle
//!
//! A [`DiagnosticTest`] is an append-only log plus a state that starts as
//! [`TestState::Running`] and becomes terminal exactly once, when [`done`]
//! reduces the log. Scenarios implement [`Diagnostic`] and report through
//! the test they are handed; [`run_diagnostic`] drives one to completion.
//!
//! [`done`]: DiagnosticTest::done

mod log;
mod sink;

pub use log::{reduce_state, LogEntry, LogLevel, TestState};
pub use sink::{ChannelSink, MultiSink, ReportEvent, ReportSink, SinkError, TerminalSink, TracingSink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// One run of a diagnostic scenario
pub struct DiagnosticTest {
    name: String,
    state: TestState,
    entries: Vec<LogEntry>,
    sink: Arc<dyn ReportSink>,
}

impl DiagnosticTest {
    /// A running test reporting to [`TracingSink`]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sink(name, Arc::new(TracingSink))
    }

    pub fn with_sink(name: impl Into<String>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            name: name.into(),
            state: TestState::Running,
            entries: Vec::new(),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TestState::Running
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Append an entry and forward it to the sink.
    ///
    /// Entries logged after the test finished are kept but do not change the
    /// state.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        if self.state.is_terminal() {
            debug!(test = %self.name, level = %level, "Entry logged after test finished");
        }
        self.deliver(ReportEvent::Entry {
            test: self.name.clone(),
            entry: entry.clone(),
        });
        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Reduce the log to a terminal state. No-op once terminal.
    pub fn done(&mut self) -> TestState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = reduce_state(&self.entries);
        self.deliver(ReportEvent::Finished {
            test: self.name.clone(),
            state: self.state,
        });
        self.state
    }

    /// Log an unrecoverable failure and finish immediately
    pub fn report_fatal(&mut self, level: LogLevel, message: impl Into<String>) -> TestState {
        self.log(level, message);
        self.done()
    }

    fn deliver(&self, event: ReportEvent) {
        if let Err(e) = self.sink.emit(&event) {
            warn!(test = %self.name, "Report sink failed: {}", e);
        }
    }
}

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub state: TestState,
    pub entries: Vec<LogEntry>,
}

impl TestOutcome {
    /// Entries at `level`, in log order
    pub fn entries_at(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level == level)
    }
}

impl From<DiagnosticTest> for TestOutcome {
    fn from(test: DiagnosticTest) -> Self {
        Self {
            name: test.name,
            state: test.state,
            entries: test.entries,
        }
    }
}

/// A runnable diagnostic scenario
#[async_trait]
pub trait Diagnostic: Send + Sync {
    /// Name used in reports
    fn name(&self) -> &str;

    /// Run to completion, reporting through `test`.
    ///
    /// Failures go into the log; nothing is returned. The runner calls
    /// `done` afterwards, so implementations only need to call it when
    /// finishing early.
    async fn run(&self, test: &mut DiagnosticTest);
}

/// Run `diagnostic` and return its outcome
pub async fn run_diagnostic(diagnostic: &dyn Diagnostic, sink: Arc<dyn ReportSink>) -> TestOutcome {
    let mut test = DiagnosticTest::with_sink(diagnostic.name(), sink);
    debug!(test = %test.name(), "Starting diagnostic");
    diagnostic.run(&mut test).await;
    test.done();
    test.into()
}
