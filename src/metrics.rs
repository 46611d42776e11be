//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; without an installed recorder the
//! calls are no-ops, so library users opt in by installing one.

use telemetry_metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Units requested from flash-sale inventory
    pub const QUOTA_REQUESTED_TOTAL: &str = "gatekeeper_quota_requested_total";
    /// Units confirmed to callers
    pub const QUOTA_CONFIRMED_TOTAL: &str = "gatekeeper_quota_confirmed_total";
    /// Units returned to inventory
    pub const QUOTA_REVOKED_TOTAL: &str = "gatekeeper_quota_revoked_total";
    /// Lock acquisition attempts by outcome
    pub const LOCK_ATTEMPTS_TOTAL: &str = "gatekeeper_lock_attempts_total";
    /// Alerts suppressed by the debounce guard
    pub const DEBOUNCE_SUPPRESSED_TOTAL: &str = "gatekeeper_debounce_suppressed_total";
    /// Expired entries removed by the sweep
    pub const SWEEP_EVICTIONS_TOTAL: &str = "gatekeeper_sweep_evictions_total";
    /// Faults reported by the health probe, by kind
    pub const PROBE_FAULTS_TOTAL: &str = "gatekeeper_probe_faults_total";
    /// 1 when the last probes passed, 0 once the store is marked unhealthy
    pub const STORE_HEALTHY: &str = "gatekeeper_store_healthy";
}

fn units(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// Record a quota acquisition and how much of it was confirmed.
pub fn record_quota_acquire(item_id: &str, requested: i64, confirmed: i64) {
    counter!(names::QUOTA_REQUESTED_TOTAL, "item" => item_id.to_string())
        .increment(units(requested));
    counter!(names::QUOTA_CONFIRMED_TOTAL, "item" => item_id.to_string())
        .increment(units(confirmed));
}

/// Record units returned to inventory.
pub fn record_quota_revoke(item_id: &str, amount: i64) {
    counter!(names::QUOTA_REVOKED_TOTAL, "item" => item_id.to_string()).increment(units(amount));
}

/// Record one lock attempt.
pub fn record_lock_attempt(acquired: bool) {
    let outcome = if acquired { "acquired" } else { "contended" };
    counter!(names::LOCK_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a suppressed duplicate alert.
pub fn record_debounce_suppressed() {
    counter!(names::DEBOUNCE_SUPPRESSED_TOTAL).increment(1);
}

/// Record entries removed by one sweep pass.
pub fn record_sweep(removed: usize) {
    counter!(names::SWEEP_EVICTIONS_TOTAL).increment(removed as u64);
}

/// Record a probe fault.
pub fn record_probe_fault(kind: &'static str) {
    counter!(names::PROBE_FAULTS_TOTAL, "kind" => kind).increment(1);
}

/// Publish the store health flag.
pub fn set_store_healthy(healthy: bool) {
    gauge!(names::STORE_HEALTHY).set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_amounts_record_zero_units() {
        assert_eq!(units(-5), 0);
        assert_eq!(units(7), 7);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_quota_acquire("X", 10, 3);
        record_quota_revoke("X", -1);
        record_lock_attempt(false);
        record_sweep(0);
        set_store_healthy(true);
    }
}
