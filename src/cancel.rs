//! Cancellation signal governing the remote writer.
//!
//! [`cancellation`] returns a [`Canceller`] and a [`CancelToken`]. The token
//! fires once the canceller is cancelled or dropped. Waiting on the token is
//! built on a crossbeam channel that never carries a message: disconnection is
//! the signal, so it composes with `select!` over other channels.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

/// Create a linked canceller/token pair.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(0);
    (
        Canceller {
            tx: Mutex::new(Some(tx)),
        },
        CancelToken { rx },
    )
}

/// Owning side of a cancellation pair. Dropping it cancels.
#[derive(Debug)]
pub struct Canceller {
    tx: Mutex<Option<Sender<()>>>,
}

impl Canceller {
    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.tx.lock().take();
    }
}

/// Observing side of a cancellation pair.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` when the token fired.
    pub fn sleep(&self, duration: Duration) -> bool {
        !matches!(self.rx.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    /// Channel that disconnects on cancellation, for use in `select!`.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
