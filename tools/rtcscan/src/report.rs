//! Human-readable output for diagnostic runs

use parking_lot::Mutex;
use rtcscan_core::diagnostic::{ReportEvent, ReportSink, SinkError, TestOutcome};
use rtcscan_core::{LogLevel, TestState};
use std::io::Write;

/// One line per log entry, prefixed with the test name
pub struct ConsoleSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

fn marker(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "   ",
        LogLevel::Success => " ok",
        LogLevel::Warning => "  !",
        LogLevel::Error => "  x",
    }
}

impl<W: Write + Send> ReportSink for ConsoleSink<W> {
    fn emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        match event {
            ReportEvent::Entry { test, entry } => {
                writeln!(writer, "{} [{}] {}", marker(entry.level), test, entry.message)?
            }
            ReportEvent::Finished { test, state } => writeln!(writer, "==> {}: {}", test, state)?,
        }
        Ok(())
    }
}

/// Summary table printed after all tests ran
pub fn write_summary<W: Write>(mut writer: W, outcomes: &[TestOutcome]) -> std::io::Result<()> {
    let width = outcomes.iter().map(|o| o.name.len()).max().unwrap_or(0);
    writeln!(writer)?;
    writeln!(writer, "Summary")?;
    for outcome in outcomes {
        writeln!(writer, "  {:<width$}  {}", outcome.name, outcome.state, width = width)?;
    }
    let failed = outcomes.iter().filter(|o| o.state == TestState::Error).count();
    writeln!(writer, "{} run, {} failed", outcomes.len(), failed)?;
    Ok(())
}

/// Whether any test ended in error
pub fn has_failures(outcomes: &[TestOutcome]) -> bool {
    outcomes.iter().any(|o| o.state == TestState::Error)
}
