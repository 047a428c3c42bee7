//! Randomized exponential backoff between failed directory queries.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MULTIPLIER: f64 = 1.5;
const RANDOMIZATION_FACTOR: f64 = 0.5;

/// Backoff schedule: each delay is the current interval randomized by
/// ±[`RANDOMIZATION_FACTOR`], after which the interval grows by
/// [`MULTIPLIER`] up to `max_interval`. No delay exceeds `max_interval`.
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    current: Duration,
    max_interval: Duration,
    max_elapsed: Option<Duration>,
    started: Instant,
}

impl ExponentialBackoff {
    pub(crate) fn new(max_interval: Duration, max_elapsed: Option<Duration>) -> Self {
        Self {
            current: INITIAL_INTERVAL.min(max_interval),
            max_interval,
            max_elapsed,
            started: Instant::now(),
        }
    }

    /// Restarts the schedule from the initial interval.
    pub(crate) fn reset(&mut self) {
        self.current = INITIAL_INTERVAL.min(self.max_interval);
        self.started = Instant::now();
    }

    /// Delay before the next attempt, or `None` once the elapsed-time budget
    /// is spent.
    pub(crate) fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed {
            if self.started.elapsed() > max_elapsed {
                return None;
            }
        }

        let delta = self.current.mul_f64(RANDOMIZATION_FACTOR);
        let low = self.current.saturating_sub(delta);
        let high = self.current + delta;
        let delay = rand::rng().random_range(low..=high).min(self.max_interval);

        self.current = self.current.mul_f64(MULTIPLIER).min(self.max_interval);
        Some(delay)
    }
}
