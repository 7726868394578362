//! Status polling schedule and the clock it sleeps on.
//!
//! ```text
//! check 1: immediate
//! check 2: after 3s
//! check 3: after 6s
//! ...
//! check 11+: after 30s (cap)
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Backoff step added per attempt.
pub const POLLING_STEP_SECS: u64 = 3;

/// Upper bound on a single sleep between status checks.
pub const MAX_POLLING_INTERVAL_SECS: u64 = 30;

/// Sleep taken after the `attempt`-th non-terminal status check (1-indexed).
pub fn polling_interval(attempt: u32) -> Duration {
    let secs = POLLING_STEP_SECS.saturating_mul(u64::from(attempt));
    Duration::from_secs(secs.min(MAX_POLLING_INTERVAL_SECS))
}

/// Time source for the wait loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock; sleeping blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that never blocks: sleeping advances its time and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = self.elapsed.lock().map(|e| *e).unwrap_or_default();
        self.start + elapsed
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}
