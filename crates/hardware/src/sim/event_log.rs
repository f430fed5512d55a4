//! Diagnostic event log.
//!
//! When enabled, notable model events are kept as JSON lines that tests and
//! tools can inspect or write out. The log is diagnostic output only; nothing
//! reads it back into model state.

use std::io::{self, Write};

use serde::Serialize;

use crate::common::BfStatus;
use crate::mau::Notification;

/// One logged event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// An instruction-bus word was dispatched.
    Instr {
        /// Model time.
        time: u64,
        /// Pipe.
        pipe: u8,
        /// Stage.
        stage: u8,
        /// Raw opcode word.
        instr: u32,
    },
    /// A stage produced a notification.
    Notification {
        /// Pipe.
        pipe: u8,
        /// Stage.
        stage: u8,
        /// The record.
        record: Notification,
    },
    /// A background task ran.
    Task {
        /// Model time.
        time: u64,
        /// Task name.
        task: &'static str,
    },
    /// A fatal error latched the simulation.
    Fatal {
        /// Entry point that failed.
        op: &'static str,
        /// Error text.
        detail: String,
        /// Status returned to the caller.
        status: i32,
    },
}

impl Event {
    /// Builds a fatal event.
    pub fn fatal(op: &'static str, detail: String, status: BfStatus) -> Self {
        Self::Fatal {
            op,
            detail,
            status: status as i32,
        }
    }
}

/// JSON-lines event sink.
#[derive(Debug, Default)]
pub struct EventLog {
    enabled: bool,
    lines: Vec<String>,
}

impl EventLog {
    /// Creates a log; a disabled log drops every event.
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    /// Returns `true` when events are recorded.
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Records one event.
    pub fn record(&mut self, event: &Event) {
        if !self.enabled {
            return;
        }
        match serde_json::to_string(event) {
            Ok(line) => self.lines.push(line),
            Err(e) => tracing::warn!(%e, "event not serializable"),
        }
    }

    /// Recorded lines, oldest first.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Writes every recorded line to `out`.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    /// Drops every recorded line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
