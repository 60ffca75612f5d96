//! Bounded FIFO between log producers and the remote writer.
//!
//! Producers push with [`EntryProducer::try_push`], which never blocks and
//! hands the entry back when the buffer is full. The single consumer pops with
//! [`EntryConsumer::pop`], which blocks until an entry arrives, every producer
//! is gone, or the cancel token fires.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use thiserror::Error;

use crate::{cancel::CancelToken, log_entry::LogEntry};

/// Default number of entries held before the sink starts shedding load.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2000;

/// Create a buffer holding at most `capacity` entries.
pub fn entry_buffer(capacity: usize) -> (EntryProducer, EntryConsumer) {
    let (tx, rx) = bounded(capacity);
    (EntryProducer { tx }, EntryConsumer { rx })
}

/// Reasons a push was refused. The entry is returned to the caller.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("log buffer is full")]
    Full(LogEntry),
    #[error("log buffer consumer has gone away")]
    Closed(LogEntry),
}

impl PushError {
    /// Recover the rejected entry.
    pub fn into_entry(self) -> LogEntry {
        match self {
            PushError::Full(entry) | PushError::Closed(entry) => entry,
        }
    }
}

/// Reasons a pop ended without an entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopError {
    #[error("log buffer closed")]
    Closed,
    #[error("cancelled while waiting for log entries")]
    Cancelled,
}

/// Producer half. Cloned freely; the buffer closes when every clone is dropped.
#[derive(Clone, Debug)]
pub struct EntryProducer {
    tx: Sender<LogEntry>,
}

impl EntryProducer {
    pub fn try_push(&self, entry: LogEntry) -> Result<(), PushError> {
        self.tx.try_send(entry).map_err(|err| match err {
            TrySendError::Full(entry) => PushError::Full(entry),
            TrySendError::Disconnected(entry) => PushError::Closed(entry),
        })
    }

    /// Number of entries waiting for the consumer.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or_default()
    }
}

/// Consumer half, owned by the remote writer.
#[derive(Debug)]
pub struct EntryConsumer {
    rx: Receiver<LogEntry>,
}

impl EntryConsumer {
    /// Block until an entry is available.
    ///
    /// Buffered entries are still returned after every producer has gone;
    /// `Closed` is reported only once the buffer is drained.
    pub fn pop(&self, cancel: &CancelToken) -> Result<LogEntry, PopError> {
        select! {
            recv(self.rx) -> entry => entry.map_err(|_| PopError::Closed),
            recv(cancel.receiver()) -> _ => Err(PopError::Cancelled),
        }
    }

    /// Take the next entry if one is already buffered.
    pub fn try_pop(&self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
