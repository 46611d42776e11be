//! Wall-clock source for expiry decisions.
//!
//! Every expiry in the store is an absolute `expires_at_millis` compared
//! against [`Clock::now_millis`]. Tests swap in a [`ManualClock`] so TTL and
//! lock-expiry behaviour can be checked without sleeping.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Sentinel expiry meaning "never expires".
pub const NEVER: i64 = i64::MAX;

/// Source of the current time in milliseconds since the UNIX epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in milliseconds since the UNIX epoch.
    fn now_millis(&self) -> i64;
}

/// Production clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_millis`.
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(millis(by), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Absolute expiry for an entry written at `now` with an optional TTL.
///
/// `None` yields [`NEVER`]; saturates instead of overflowing for huge TTLs.
#[must_use]
pub fn expiry_after(now: i64, ttl: Option<Duration>) -> i64 {
    match ttl {
        Some(ttl) => now.saturating_add(millis(ttl)),
        None => NEVER,
    }
}

/// Convert an integer `ttl_seconds`: negative means "never expires".
#[must_use]
pub fn ttl_from_secs(ttl_seconds: i64) -> Option<Duration> {
    u64::try_from(ttl_seconds).ok().map(Duration::from_secs)
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
