//! In-memory connection factory following a failure script.
//!
//! Every interaction is appended to a shared event log so tests can assert
//! on the exact order of dials, sends and resource releases.

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use logship::{CancelToken, Connection, Connector, LogEntry, LogEntryList, LogStream};

/// Observable interaction with the scripted remote side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Dialed,
    DialFailed,
    Opened,
    OpenFailed,
    Sent(LogEntry),
    SendFailed(String),
    CloseSend,
    Closed,
}

/// Failure plan for a [`ScriptedConnector`].
#[derive(Clone, Debug, Default)]
pub struct Script {
    /// Number of leading dial attempts that fail.
    pub failing_dials: usize,
    /// Fail every dial attempt.
    pub always_fail_dial: bool,
    /// Fail every attempt to open a log stream.
    pub fail_open: bool,
    /// 1-based index, across all connections, of the send that fails.
    pub fail_send_at: Option<usize>,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    dial_times: Mutex<Vec<Instant>>,
    dials: AtomicUsize,
    sends: AtomicUsize,
}

impl Shared {
    fn push(&self, event: Event) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}

/// Connector whose behaviour is dictated by a [`Script`].
#[derive(Clone)]
pub struct ScriptedConnector {
    script: Script,
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            shared: Arc::default(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().expect("event log poisoned").clone()
    }

    pub fn dial_count(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    pub fn dial_times(&self) -> Vec<Instant> {
        self.shared.dial_times.lock().expect("dial log poisoned").clone()
    }

    /// Entries delivered successfully, in delivery order.
    pub fn sent(&self) -> Vec<LogEntry> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sent(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent().into_iter().map(LogEntry::into_message).collect()
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn dial(
        &mut self,
        _endpoint: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> io::Result<ScriptedConnection> {
        let attempt = self.shared.dials.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .dial_times
            .lock()
            .expect("dial log poisoned")
            .push(Instant::now());
        if self.script.always_fail_dial || attempt <= self.script.failing_dials {
            self.shared.push(Event::DialFailed);
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("dial {attempt} refused"),
            ));
        }
        self.shared.push(Event::Dialed);
        Ok(ScriptedConnection {
            script: self.script.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct ScriptedConnection {
    script: Script,
    shared: Arc<Shared>,
}

impl Connection for ScriptedConnection {
    type Stream = ScriptedStream;

    fn open_log_stream(&mut self) -> io::Result<ScriptedStream> {
        if self.script.fail_open {
            self.shared.push(Event::OpenFailed);
            return Err(io::Error::other("stream rejected"));
        }
        self.shared.push(Event::Opened);
        Ok(ScriptedStream {
            fail_send_at: self.script.fail_send_at,
            shared: Arc::clone(&self.shared),
        })
    }

    fn close(&mut self) {
        self.shared.push(Event::Closed);
    }
}

pub struct ScriptedStream {
    fail_send_at: Option<usize>,
    shared: Arc<Shared>,
}

impl LogStream for ScriptedStream {
    fn send(&mut self, batch: &LogEntryList) -> io::Result<()> {
        assert_eq!(batch.entries.len(), 1, "writer sends single-entry batches");
        let index = self.shared.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = batch.entries[0].clone();
        if self.fail_send_at == Some(index) {
            self.shared
                .push(Event::SendFailed(entry.message().to_owned()));
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream reset"));
        }
        self.shared.push(Event::Sent(entry));
        Ok(())
    }

    fn close_send(&mut self) -> io::Result<()> {
        self.shared.push(Event::CloseSend);
        Ok(())
    }
}
