//! Destinations for command results.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{info, warn};

/// One executed command and what the interpreter printed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub target_frame: i32,
    pub executed_frame: i32,
    pub command: String,
    pub output: String,
}

/// Receives the outcome of every drained command on the simulation thread.
pub trait CommandSink {
    fn on_result(&self, report: &CommandReport);
    fn on_error(&self, report: &CommandReport);
}

/// Default sink: results at info, failures at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CommandSink for TracingSink {
    fn on_result(&self, report: &CommandReport) {
        info!(
            target: "console::proxy",
            frame = report.executed_frame,
            target_frame = report.target_frame,
            command = %report.command,
            output = %report.output,
            "command.executed"
        );
    }

    fn on_error(&self, report: &CommandReport) {
        warn!(
            target: "console::proxy",
            frame = report.executed_frame,
            target_frame = report.target_frame,
            command = %report.command,
            output = %report.output,
            "command.failed"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Result(CommandReport),
    Error(CommandReport),
}

impl SinkEntry {
    pub fn report(&self) -> &CommandReport {
        match self {
            SinkEntry::Result(report) | SinkEntry::Error(report) => report,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SinkEntry::Error(_))
    }
}

/// Keeps every report in memory, for hosts that draw their own console
/// output. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Rc<RefCell<Vec<SinkEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.borrow().clone()
    }

    pub fn take(&self) -> Vec<SinkEntry> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    pub fn outputs(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.report().output.clone())
            .collect()
    }
}

impl CommandSink for MemorySink {
    fn on_result(&self, report: &CommandReport) {
        self.entries
            .borrow_mut()
            .push(SinkEntry::Result(report.clone()));
    }

    fn on_error(&self, report: &CommandReport) {
        self.entries
            .borrow_mut()
            .push(SinkEntry::Error(report.clone()));
    }
}
