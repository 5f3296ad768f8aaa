//! Report sinks
//!
//! A [`ReportSink`] receives every log entry a test appends and its final
//! state. The core never formats for a UI; reporters plug in here.

use super::log::{LogEntry, LogLevel, TestState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What a running test reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    /// A log entry was appended
    Entry { test: String, entry: LogEntry },
    /// The test reached a terminal state
    Finished { test: String, state: TestState },
}

impl ReportEvent {
    pub fn test(&self) -> &str {
        match self {
            ReportEvent::Entry { test, .. } | ReportEvent::Finished { test, .. } => test,
        }
    }
}

/// Error type for sink operations
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel send error: {0}")]
    Channel(String),
}

/// Delivery target for report events
pub trait ReportSink: Send + Sync {
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError>;
}

/// Mirrors entries into `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        match event {
            ReportEvent::Entry { test, entry } => match entry.level {
                LogLevel::Info => tracing::info!(test = %test, level = %entry.level, "{}", entry.message),
                LogLevel::Success => {
                    tracing::info!(test = %test, level = %entry.level, "{}", entry.message)
                }
                LogLevel::Warning => {
                    tracing::warn!(test = %test, level = %entry.level, "{}", entry.message)
                }
                LogLevel::Error => {
                    tracing::error!(test = %test, level = %entry.level, "{}", entry.message)
                }
            },
            ReportEvent::Finished { test, state } => {
                tracing::info!(test = %test, state = %state, "Test finished")
            }
        }
        Ok(())
    }
}

/// JSONL output to a writer
pub struct TerminalSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ReportSink for TerminalSink<W> {
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        let line =
            serde_json::to_string(event).map_err(|e| SinkError::Serialization(e.to_string()))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Broadcast channel sink for external reporters
pub struct ChannelSink {
    sender: broadcast::Sender<ReportEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ReportEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Channel sink with capacity 256
    pub fn with_default_capacity() -> (Self, broadcast::Receiver<ReportEvent>) {
        Self::new(256)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ReportSink for ChannelSink {
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|e| SinkError::Channel(e.to_string()))?;
        Ok(())
    }
}

/// Fans events out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for MultiSink {
    /// Delivers to every sink; the first error is returned after all sinks
    /// were tried
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
