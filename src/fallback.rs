//! Local side channel for text that could not be shipped remotely.
//!
//! Overflowing entries and writer failure reports are written here
//! synchronously, one line each. Production code uses stderr; tests swap in
//! an in-memory writer.

use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Shared, line-oriented fallback writer.
#[derive(Clone)]
pub struct Fallback {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Fallback {
    /// Fallback writing to the process's standard error stream.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Fallback writing to an arbitrary writer.
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write `text` followed by a newline. Write errors are ignored.
    pub fn write_line(&self, text: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{text}").and_then(|()| out.flush());
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").finish_non_exhaustive()
    }
}
