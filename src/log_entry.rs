//! Log entry representation shipped to the remote logging service.
//!
//! A [`LogEntry`] is created once, when the sink observes a logging call, and
//! is never mutated afterwards. [`LogEntryList`] is the batch type carried by
//! the log stream.

use std::fmt;
use std::panic::Location;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::level::Severity;

/// Source location of a logging call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite<'a> {
    /// Source file path.
    pub file: &'a str,
    /// Line number in the source file.
    pub line: u32,
}

impl<'a> CallSite<'a> {
    pub fn new(file: &'a str, line: u32) -> Self {
        Self { file, line }
    }
}

impl CallSite<'static> {
    /// Location of the outermost `#[track_caller]` frame calling this.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for CallSite<'static> {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A single logged event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    timestamp: SystemTime,
    severity: Severity,
    message: String,
    location: Option<String>,
    instruction_ref: Option<String>,
}

impl LogEntry {
    /// Construct an entry with no location or instruction reference.
    pub fn new(timestamp: SystemTime, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            severity,
            message: message.into(),
            location: None,
            instruction_ref: None,
        }
    }

    /// Attach a `file:line` location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attach the identifier of the instruction that produced the entry.
    pub fn with_instruction_ref(mut self, id: impl Into<String>) -> Self {
        self.instruction_ref = Some(id.into());
        self
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `file:line` of the logging call, when it was known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn instruction_ref(&self) -> Option<&str> {
        self.instruction_ref.as_deref()
    }

    /// Give up ownership of the message text.
    pub fn into_message(self) -> String {
        self.message
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = DateTime::<Utc>::from(self.timestamp);
        write!(
            f,
            "{} {}",
            timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.severity
        )?;
        if let Some(id) = &self.instruction_ref {
            write!(f, " [{id}]")?;
        }
        if let Some(location) = &self.location {
            write!(f, " {location}")?;
        }
        write!(f, " - {}", self.message)
    }
}

/// Batch of entries sent in one stream message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogEntryList {
    pub entries: Vec<LogEntry>,
}

impl LogEntryList {
    /// Wrap a single entry.
    pub fn single(entry: LogEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

impl fmt::Display for LogEntryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
