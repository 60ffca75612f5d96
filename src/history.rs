//! Bounded record of the entries most recently handed to the log stream.
//!
//! Kept for status pages and crash diagnostics: when remote delivery is in
//! doubt, the tail of what was sent is still available locally.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::log_entry::{LogEntry, LogEntryList};

/// Shared ring of recently sent entries. Clones share the same ring.
#[derive(Clone, Debug)]
pub struct EntryHistory {
    inner: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl EntryHistory {
    /// History remembering up to `capacity` entries; zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn record(&self, batch: &LogEntryList) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.inner.lock();
        for entry in &batch.entries {
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(entry.clone());
        }
    }

    /// Oldest-first copy of the remembered entries.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.inner.lock().iter().cloned().collect()
    }
}
