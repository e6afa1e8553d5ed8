use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

/// One-shot shutdown signal shared by long-running loops.
///
/// Backed by a zero-capacity channel that never carries a message: the
/// signal fires when the single sender is dropped, which wakes every
/// receiver at once. Loops either poll [`is_triggered`](Self::is_triggered)
/// or sleep with [`wait`](Self::wait), which returns early on trigger, or
/// put [`receiver`](Self::receiver) in a `select!`.
///
/// Cloning is cheap and all clones observe the same signal. Triggering is
/// idempotent and safe from any thread.
#[derive(Clone)]
pub struct Shutdown {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        self.trigger.lock().take().is_some()
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout` or until the signal fires.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.signal.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Receiver that becomes ready (with an error) once the signal fires.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
