//! Wall-clock sources for stamping change entries.
//!
//! Queue order is defined by the millisecond timestamp taken at enqueue time,
//! so the clock is injected rather than read from ambient state. Production
//! code uses [`SystemClock`]; tests and deterministic embeddings use
//! [`ManualClock`].

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// A source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> Timestamp;
}

/// Clock backed by the system's UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        // Pre-epoch system time clamps to zero.
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A settable clock.
///
/// Every read returns the current value and then advances it by `step`
/// milliseconds. A step of zero gives a frozen clock, which is how equal
/// `changeTime` values are produced on purpose.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    step: u64,
}

impl ManualClock {
    /// Create a frozen clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
            step: 0,
        }
    }

    /// Create a clock that advances by `step` after every read.
    pub fn with_step(start: Timestamp, step: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            step,
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Read the clock without advancing it.
    pub fn peek(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}
