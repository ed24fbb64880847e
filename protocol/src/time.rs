//! # Time Source
//!
//! Nothing in Vela ticks. Mana refill, yield accrual and vesting progress
//! are pure functions of stored timestamps and the `now` of the current
//! call. A [`Clock`] is only consulted at call boundaries to produce that
//! `now`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Something that can tell the current time.
pub trait Clock: Send + Sync {
    /// The current instant as unix seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        from_datetime(Utc::now())
    }
}

/// A clock that only moves when told to. Used by tests and script replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Jumps to an absolute instant. Going backwards is allowed; the
    /// ledgers reject negative spans where it matters.
    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Renders a timestamp as RFC 3339 for logs. Out-of-range values fall
/// back to the raw number.
pub fn display(ts: Timestamp) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}

/// Converts a `chrono` instant to a ledger timestamp.
pub fn from_datetime(dt: DateTime<Utc>) -> Timestamp {
    dt.timestamp()
}
