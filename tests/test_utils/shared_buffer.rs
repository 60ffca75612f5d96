//! Shared buffer capturing fallback output in tests.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Thread-safe byte buffer usable as a fallback writer.
///
/// The inner `Arc<Mutex<Vec<u8>>>` is kept private so tests can't bypass the
/// `Write` implementation or mutate the buffer without locking.
#[derive(Clone, Default)]
pub struct SharedBuf {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    /// Buffer contents decoded as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8(self.buffer.lock().expect("SharedBuf mutex poisoned").clone())
            .expect("Buffer contains invalid UTF-8")
    }

    /// Buffer contents split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .expect("SharedBuf mutex poisoned")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
