//! Wiring of buffer, sink and writer into a running pipeline.

use std::{io, sync::Arc, thread};

use log::warn;
use parking_lot::Mutex;

use crate::{
    buffer::entry_buffer,
    cancel::{Canceller, cancellation},
    config::RemoteLoggingConfig,
    fallback::Fallback,
    history::EntryHistory,
    log_entry::LogEntry,
    remote::{Connector, RemoteWriter, WriterError, WriterSettings, WriterState, WriterStatus},
    sink::{Logger, RemoteSink},
};

/// Start shipping logs to `config.endpoint`, reporting degraded delivery on
/// stderr.
pub fn setup_remote_logging<C: Connector>(
    config: &RemoteLoggingConfig,
    connector: C,
) -> io::Result<RemoteLogging> {
    setup_remote_logging_with_fallback(config, connector, Fallback::stderr())
}

/// Start shipping logs, reporting degraded delivery on `fallback`.
pub fn setup_remote_logging_with_fallback<C: Connector>(
    config: &RemoteLoggingConfig,
    connector: C,
    fallback: Fallback,
) -> io::Result<RemoteLogging> {
    let (producer, consumer) = entry_buffer(config.capacity);
    let sink = Arc::new(RemoteSink::new(producer, fallback.clone()));
    let history = EntryHistory::new(config.history_capacity);
    let writer = RemoteWriter::new(connector, consumer, WriterSettings::from(config), fallback)
        .with_history(history.clone());
    let status = writer.status();
    let (canceller, token) = cancellation();
    let handle = writer.spawn(token)?;
    Ok(RemoteLogging {
        logger: Logger::new(sink.clone()),
        sink,
        history,
        status,
        canceller,
        handle: Mutex::new(Some(handle)),
    })
}

/// Handle to a running remote logging pipeline.
///
/// Dropping the handle cancels the writer and waits for it to exit. Loggers
/// obtained from [`RemoteLogging::logger`] stay usable afterwards; their
/// entries then go to the fallback channel.
pub struct RemoteLogging {
    logger: Logger,
    sink: Arc<RemoteSink>,
    history: EntryHistory,
    status: WriterStatus,
    canceller: Canceller,
    handle: Mutex<Option<thread::JoinHandle<WriterError>>>,
}

impl RemoteLogging {
    /// Logging capability feeding this pipeline.
    pub fn logger(&self) -> Logger {
        self.logger.clone()
    }

    pub fn state(&self) -> WriterState {
        self.status.get()
    }

    /// Entries shed to the fallback channel: the buffer was full, or the
    /// writer had already stopped.
    pub fn overflow_count(&self) -> u64 {
        self.sink.overflow_count()
    }

    /// Entries most recently handed to the log stream, oldest first.
    pub fn recent_entries(&self) -> Vec<LogEntry> {
        self.history.snapshot()
    }

    /// Cancel the writer and wait for it to stop.
    ///
    /// Returns the writer's exit reason, or `None` if it was already joined.
    pub fn shutdown(&self) -> Option<WriterError> {
        self.canceller.cancel();
        let handle = self.handle.lock().take()?;
        match handle.join() {
            Ok(reason) => Some(reason),
            Err(_) => {
                warn!("remote writer thread panicked");
                None
            }
        }
    }
}

impl Drop for RemoteLogging {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RemoteLogging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLogging")
            .field("state", &self.state())
            .field("overflow_count", &self.overflow_count())
            .finish_non_exhaustive()
    }
}
