use std::fmt::Debug;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::shutdown::Shutdown;

struct State<T> {
    pending: T,
    sent: T,
    last_sent_at: Option<Instant>,
    timer_armed: bool,
}

struct Inner<T> {
    name: &'static str,
    min_interval: Duration,
    state: Mutex<State<T>>,
    send: Box<dyn Fn(T) + Send + Sync>,
    shutdown: Shutdown,
}

/// Trailing-edge coalescing rate limiter for one actuator group.
///
/// [`submit`](Self::submit) overwrites the pending value. If the group has
/// been quiet for at least `min_interval` the value goes out at once;
/// otherwise a single deferred send is armed for the end of the cooldown,
/// and when it fires it sends whatever is pending *then*. Intermediate
/// values are skipped, the latest one is never lost.
///
/// A value equal to the last one sent never reaches the wire.
///
/// The pending value, the last-sent value and the timer flag live under
/// one lock, and sends happen while holding it, so a deferred send always
/// reads the newest value submitted before it fired.
pub struct Throttle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Throttle<T>
where
    T: Copy + PartialEq + Debug + Send + 'static,
{
    /// `initial` counts as already sent.
    pub fn new<F>(name: &'static str, initial: T, min_interval: Duration, send: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name,
                min_interval,
                state: Mutex::new(State {
                    pending: initial,
                    sent: initial,
                    last_sent_at: None,
                    timer_armed: false,
                }),
                send: Box::new(send),
                shutdown: Shutdown::new(),
            }),
        }
    }

    pub fn submit(&self, value: T) {
        let inner = &self.inner;
        if inner.shutdown.is_triggered() {
            return;
        }

        let mut state = inner.state.lock();
        state.pending = value;
        if state.pending == state.sent {
            return;
        }

        let now = Instant::now();
        let elapsed = state.last_sent_at.map(|at| now.duration_since(at));
        match elapsed {
            Some(elapsed) if elapsed < inner.min_interval => {
                if !state.timer_armed {
                    state.timer_armed = true;
                    drop(state);
                    self.arm(inner.min_interval - elapsed);
                }
            }
            _ => inner.flush(&mut state),
        }
    }

    fn arm(&self, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("ptz-{}-throttle", inner.name))
            .spawn(move || {
                if inner.shutdown.wait(delay) {
                    return;
                }
                let mut state = inner.state.lock();
                state.timer_armed = false;
                inner.flush(&mut state);
            });

        if let Err(e) = spawned {
            tracing::warn!(group = self.inner.name, error = %e, "failed to arm throttle timer");
            let mut state = self.inner.state.lock();
            state.timer_armed = false;
            self.inner.flush(&mut state);
        }
    }

    /// Set both pending and sent to `value`, then run `then` while still
    /// holding the lock. A deferred send that fires afterwards finds
    /// nothing to do, so nothing submitted earlier can overtake `then`.
    pub fn reset_with<R>(&self, value: T, then: impl FnOnce() -> R) -> R {
        let mut state = self.inner.state.lock();
        state.pending = value;
        state.sent = value;
        tracing::trace!(group = self.inner.name, ?value, "throttle reset");
        then()
    }

    /// Last value handed to the send function.
    pub fn last_sent(&self) -> T {
        self.inner.state.lock().sent
    }

    /// Cancel any armed deferred send. Later submissions are ignored.
    pub fn close(&self) {
        self.inner.shutdown.trigger();
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        self.inner.shutdown.trigger();
    }
}

impl<T: Copy + PartialEq + Debug> Inner<T> {
    fn flush(&self, state: &mut MutexGuard<'_, State<T>>) {
        if state.pending == state.sent {
            return;
        }
        let value = state.pending;
        tracing::trace!(group = self.name, ?value, "throttle send");
        (self.send)(value);
        state.sent = value;
        state.last_sent_at = Some(Instant::now());
    }
}
