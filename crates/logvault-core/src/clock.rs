//! Time source injected into the pipeline.
//!
//! Every presigned URL embeds the instant it was signed at, so tests need a
//! fixed clock to get stable signatures.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock that advances by a fixed step on every read.
///
/// A zero step gives a frozen clock.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl ManualClock {
    /// A clock frozen at `instant`.
    #[must_use]
    pub fn fixed(instant: DateTime<Utc>) -> Self {
        Self::stepping(instant, Duration::zero())
    }

    /// A clock starting at `start` that moves forward by `step` after every read.
    #[must_use]
    pub fn stepping(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock();
        let now = *current;
        *current = now + self.step;
        now
    }
}
