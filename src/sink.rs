//! Logging capability handed to code that logs.
//!
//! [`LogSink`] is the destination trait; [`Logger`] is the cheap, cloneable
//! handle passed around as a dependency. [`RemoteSink`] turns each call into a
//! [`LogEntry`] and pushes it onto the bounded buffer without blocking. When
//! the buffer is full the entry is shed: its message goes to the fallback
//! channel and it is never shipped.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use crate::{
    buffer::EntryProducer,
    context::Scope,
    fallback::Fallback,
    level::{Level, Severity},
    log_entry::{CallSite, LogEntry},
};

/// Destination for log calls.
///
/// Implementations must not block the caller and must tolerate concurrent
/// calls from any number of threads.
pub trait LogSink: Send + Sync {
    fn log(&self, scope: &Scope, level: Level, site: Option<CallSite<'_>>, message: &str);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _scope: &Scope, _level: Level, _site: Option<CallSite<'_>>, _message: &str) {}
}

/// Sink feeding the remote writer's buffer.
#[derive(Debug)]
pub struct RemoteSink {
    producer: EntryProducer,
    fallback: Fallback,
    overflowed: AtomicU64,
}

impl RemoteSink {
    pub fn new(producer: EntryProducer, fallback: Fallback) -> Self {
        Self {
            producer,
            fallback,
            overflowed: AtomicU64::new(0),
        }
    }

    /// Number of entries shed to the fallback channel, whether the buffer was
    /// full or its consumer had gone away.
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

impl LogSink for RemoteSink {
    fn log(&self, scope: &Scope, level: Level, site: Option<CallSite<'_>>, message: &str) {
        let mut entry = LogEntry::new(SystemTime::now(), Severity::from(level), message);
        if let Some(site) = site {
            entry = entry.with_location(site.to_string());
        }
        if let Some(id) = scope.instruction_id() {
            entry = entry.with_instruction_ref(id);
        }

        if let Err(err) = self.producer.try_push(entry) {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            self.fallback.write_line(err.into_entry().message());
        }
    }
}

/// Cloneable handle to a [`LogSink`].
///
/// The level helpers capture their caller's location via `#[track_caller]`;
/// wrappers that should report their own caller instead must be annotated
/// with `#[track_caller]` too.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger discarding every call.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    /// Log with an explicit, possibly unknown, call site.
    pub fn log_at(&self, scope: &Scope, level: Level, site: Option<CallSite<'_>>, message: &str) {
        self.sink.log(scope, level, site, message);
    }

    #[track_caller]
    pub fn log(&self, scope: &Scope, level: Level, message: &str) {
        self.log_at(scope, level, Some(CallSite::caller()), message);
    }

    #[track_caller]
    pub fn debug(&self, scope: &Scope, message: &str) {
        self.log(scope, Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, scope: &Scope, message: &str) {
        self.log(scope, Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, scope: &Scope, message: &str) {
        self.log(scope, Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, scope: &Scope, message: &str) {
        self.log(scope, Level::Error, message);
    }

    #[track_caller]
    pub fn fatal(&self, scope: &Scope, message: &str) {
        self.log(scope, Level::Fatal, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::entry_buffer;
    use rstest::rstest;

    #[rstest]
    fn noop_logger_accepts_calls() {
        let logger = Logger::default();
        logger.fatal(&Scope::root(), "ignored");
    }

    #[rstest]
    fn level_helpers_report_their_caller() {
        let (producer, consumer) = entry_buffer(4);
        let logger = Logger::new(Arc::new(RemoteSink::new(producer, Fallback::stderr())));
        let line = line!() + 1;
        logger.warn(&Scope::root(), "here");
        let entry = consumer.try_pop().expect("entry buffered");
        assert_eq!(entry.location(), Some(format!("{}:{line}", file!()).as_str()));
        assert_eq!(entry.severity(), Severity::Warn);
    }

    #[rstest]
    fn missing_call_site_omits_location() {
        let (producer, consumer) = entry_buffer(4);
        let sink = RemoteSink::new(producer, Fallback::stderr());
        sink.log(&Scope::root(), Level::Info, None, "anonymous");
        let entry = consumer.try_pop().expect("entry buffered");
        assert_eq!(entry.location(), None);
        assert_eq!(sink.overflow_count(), 0);
    }
}
