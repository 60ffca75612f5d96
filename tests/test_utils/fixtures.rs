//! Fixtures and polling helpers shared by the integration tests.

use std::{
    thread,
    time::{Duration, Instant},
};

use logship::Fallback;
use rstest::fixture;

use super::shared_buffer::SharedBuf;

/// Fallback channel writing into an inspectable in-memory buffer.
#[fixture]
pub fn captured_fallback() -> (SharedBuf, Fallback) {
    let buffer = SharedBuf::default();
    let fallback = Fallback::new(buffer.clone());
    (buffer, fallback)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
