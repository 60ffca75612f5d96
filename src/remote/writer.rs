//! Reconnecting drain-and-send loop.
//!
//! [`RemoteWriter::run`] supervises connection attempts until it is
//! cancelled. Each attempt dials, opens a log stream and then sends buffered
//! entries one at a time. Any dial, open or send failure is reported to the
//! fallback channel and followed by the fixed retry delay; there is no
//! exponential backoff and no retry budget.

use std::{
    convert::Infallible,
    io,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread,
    time::Duration,
};

use log::debug;
use thiserror::Error;

use crate::{
    buffer::{EntryConsumer, PopError},
    cancel::CancelToken,
    config::RemoteLoggingConfig,
    fallback::Fallback,
    history::EntryHistory,
    log_entry::LogEntryList,
};

use super::transport::{Connection, Connector, LogStream};

/// Lifecycle of a [`RemoteWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// Dialing or opening the log stream, or waiting to retry.
    Connecting,
    /// Draining the buffer into an open stream.
    Streaming,
    /// The supervising loop has exited.
    Stopped,
}

impl WriterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WriterState::Connecting,
            1 => WriterState::Streaming,
            _ => WriterState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WriterState::Connecting => 0,
            WriterState::Streaming => 1,
            WriterState::Stopped => 2,
        }
    }
}

/// Shared, read-only view of a writer's state.
#[derive(Clone, Debug)]
pub struct WriterStatus(Arc<AtomicU8>);

impl WriterStatus {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WriterState::Connecting.as_u8())))
    }

    pub fn get(&self) -> WriterState {
        WriterState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WriterState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Reasons a connection attempt ended.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("dialing {endpoint} failed: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("opening log stream failed: {0}")]
    OpenStream(#[source] io::Error),
    #[error("sending log entry failed: {0}")]
    Send(#[source] io::Error),
    #[error("internal: log buffer closed")]
    BufferClosed,
    #[error("remote logging cancelled")]
    Cancelled,
}

impl WriterError {
    /// Whether the supervising loop stops instead of retrying.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WriterError::BufferClosed | WriterError::Cancelled)
    }
}

impl From<PopError> for WriterError {
    fn from(err: PopError) -> Self {
        match err {
            PopError::Closed => WriterError::BufferClosed,
            PopError::Cancelled => WriterError::Cancelled,
        }
    }
}

/// Addressing and timing used by the writer.
#[derive(Clone, Debug)]
pub struct WriterSettings {
    pub endpoint: String,
    pub dial_timeout: Duration,
    pub retry_delay: Duration,
}

impl From<&RemoteLoggingConfig> for WriterSettings {
    fn from(config: &RemoteLoggingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            dial_timeout: config.dial_timeout,
            retry_delay: config.retry_delay,
        }
    }
}

struct ConnectionGuard<C: Connection>(C);

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.0.close();
    }
}

struct StreamGuard<S: LogStream>(S);

impl<S: LogStream> Drop for StreamGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.0.close_send() {
            debug!("closing log stream failed: {err}");
        }
    }
}

/// Consumer side of the log buffer, owning the remote connection.
pub struct RemoteWriter<C: Connector> {
    connector: C,
    consumer: EntryConsumer,
    settings: WriterSettings,
    fallback: Fallback,
    history: EntryHistory,
    status: WriterStatus,
}

impl<C: Connector> RemoteWriter<C> {
    pub fn new(
        connector: C,
        consumer: EntryConsumer,
        settings: WriterSettings,
        fallback: Fallback,
    ) -> Self {
        Self {
            connector,
            consumer,
            settings,
            fallback,
            history: EntryHistory::new(0),
            status: WriterStatus::new(),
        }
    }

    /// Record every batch into `history` before it is sent.
    pub fn with_history(mut self, history: EntryHistory) -> Self {
        self.history = history;
        self
    }

    pub fn status(&self) -> WriterStatus {
        self.status.clone()
    }

    /// Run the writer on a dedicated thread until `cancel` fires.
    pub fn spawn(self, cancel: CancelToken) -> io::Result<thread::JoinHandle<WriterError>> {
        thread::Builder::new()
            .name("logship-remote-writer".into())
            .spawn(move || self.run(&cancel))
    }

    /// Supervise connection attempts until cancelled or the buffer closes.
    ///
    /// Returns the reason the loop stopped: [`WriterError::Cancelled`] or
    /// [`WriterError::BufferClosed`].
    pub fn run(mut self, cancel: &CancelToken) -> WriterError {
        let reason = loop {
            self.status.set(WriterState::Connecting);
            let Err(err) = self.connect(cancel);
            if err.is_terminal() {
                break err;
            }
            self.fallback.write_line(&format!(
                "Remote logging failed: {err}. Retrying in {:?} ...",
                self.settings.retry_delay
            ));
            if cancel.sleep(self.settings.retry_delay) {
                break WriterError::Cancelled;
            }
        };
        self.status.set(WriterState::Stopped);
        debug!(
            "remote writer for {} stopped: {reason}",
            self.settings.endpoint
        );
        reason
    }

    /// One connection attempt. Only ever ends with an error.
    fn connect(&mut self, cancel: &CancelToken) -> Result<Infallible, WriterError> {
        if cancel.is_cancelled() {
            return Err(WriterError::Cancelled);
        }
        let endpoint = &self.settings.endpoint;
        let connection = self
            .connector
            .dial(endpoint, self.settings.dial_timeout, cancel)
            .map_err(|source| {
                if cancel.is_cancelled() {
                    WriterError::Cancelled
                } else {
                    WriterError::Dial {
                        endpoint: endpoint.clone(),
                        source,
                    }
                }
            })?;
        // Guards drop in reverse order: the stream closes before the connection.
        let mut connection = ConnectionGuard(connection);
        let mut stream = StreamGuard(
            connection
                .0
                .open_log_stream()
                .map_err(WriterError::OpenStream)?,
        );
        self.status.set(WriterState::Streaming);
        debug!("streaming log entries to {endpoint}");

        loop {
            let entry = self.consumer.pop(cancel)?;
            let batch = LogEntryList::single(entry);
            self.history.record(&batch);
            if let Err(err) = stream.0.send(&batch) {
                self.fallback
                    .write_line(&format!("Failed to send message: {err}\n{batch}"));
                return Err(WriterError::Send(err));
            }
        }
    }
}
