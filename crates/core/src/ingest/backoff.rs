use std::time::Duration;

/// Exponential reconnect delay: `initial`, doubling per attempt, capped at `max`.
///
/// With the defaults a camera that stays unreachable is retried after
/// 1s, 2s, 4s, 8s, 16s, 30s, 30s, … until shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before the 1-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << shift)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// The unbounded sequence of delays, starting at attempt 1.
    pub fn delays(self) -> impl Iterator<Item = Duration> {
        (1u32..).map(move |attempt| self.delay(attempt))
    }
}
