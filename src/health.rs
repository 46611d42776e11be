//! Store liveness self-test.
//!
//! [`HealthProber::ping`] writes a short-lived deny-list entry, checks it is
//! readable, waits past its TTL and checks it is gone. Deviations come back
//! as [`ProbeError`]s; `ping` itself never fails or panics.
//!
//! [`HealthTracker`] keeps the outcome of periodic probes for the monitoring
//! collaborator and flips to unhealthy after consecutive failures.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::Error;
use crate::backend::CacheStore;
use crate::blacklist::blacklist_key;
use crate::config::HealthConfig;

/// Broad class of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Read back something other than what was written
    Data,
    /// Operation failed, panicked, or expiry was not honoured
    Access,
}

impl FaultKind {
    fn code(self) -> &'static str {
        match self {
            Self::Data => "CACHE_DATA_FAULT",
            Self::Access => "CACHE_ACCESS_FAULT",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Access => "access",
        }
    }
}

/// Structured probe failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeError {
    /// Stable error code
    pub code: &'static str,
    /// Fault class
    pub kind: FaultKind,
    /// Probe step that failed: `write`, `read` or `expiry`
    pub tag: &'static str,
    /// Human-readable description
    pub description: String,
    /// Underlying error, if any
    pub cause: Option<String>,
}

impl ProbeError {
    fn new(kind: FaultKind, tag: &'static str, description: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            kind,
            tag,
            description: description.into(),
            cause: None,
        }
    }

    fn caused_by(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// Synthetic write-read-wait-read check against a cache store.
#[derive(Clone)]
pub struct HealthProber {
    store: Arc<dyn CacheStore>,
    probe_ttl: Duration,
    margin: Duration,
}

impl HealthProber {
    /// Create a prober over `store`.
    pub fn new(store: Arc<dyn CacheStore>, config: &HealthConfig) -> Self {
        Self {
            store,
            probe_ttl: config.probe_ttl,
            margin: config.probe_margin,
        }
    }

    /// Run one probe. An empty list means the store is healthy.
    pub async fn ping(&self) -> Vec<ProbeError> {
        let key = blacklist_key(&format!("health-probe-{}", Uuid::new_v4().simple()));
        let written = json!({ "probe": Uuid::new_v4().to_string() });
        let mut errors = Vec::new();

        if let Err(e) = self.guarded("write", || {
            self.store.put(&key, written.clone(), Some(self.probe_ttl))
        }) {
            errors.push(e);
            return errors;
        }

        match self.guarded("read", || self.store.get(&key)) {
            Ok(Some(read)) if read == written => {}
            Ok(Some(read)) => errors.push(ProbeError::new(
                FaultKind::Data,
                "read",
                format!("read back {read} but wrote {written}"),
            )),
            Ok(None) => errors.push(ProbeError::new(
                FaultKind::Data,
                "read",
                "entry not visible immediately after write",
            )),
            Err(e) => errors.push(e),
        }

        tokio::time::sleep(self.probe_ttl.saturating_add(self.margin)).await;

        match self.guarded("expiry", || self.store.get(&key)) {
            Ok(None) => {}
            Ok(Some(_)) => {
                errors.push(ProbeError::new(
                    FaultKind::Access,
                    "expiry",
                    format!(
                        "entry still present {}ms after its {}ms TTL",
                        self.margin.as_millis(),
                        self.probe_ttl.as_millis()
                    ),
                ));
                // Don't leave the probe entry behind
                if let Err(e) = self.guarded("expiry", || self.store.delete(&key)) {
                    warn!(key = %key, error = %e.description, "Failed to remove stale health entry");
                }
            }
            Err(e) => errors.push(e),
        }

        for error in &errors {
            crate::metrics::record_probe_fault(error.kind.label());
        }
        errors
    }

    /// Run a store call, turning both `Err` and panics into an access fault.
    fn guarded<T>(
        &self,
        tag: &'static str,
        op: impl FnOnce() -> crate::Result<T>,
    ) -> Result<T, ProbeError> {
        match catch_unwind(AssertUnwindSafe(op)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(fault_from_error(tag, &e)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(
                    ProbeError::new(FaultKind::Access, tag, "store operation panicked")
                        .caused_by(message),
                )
            }
        }
    }
}

fn fault_from_error(tag: &'static str, error: &Error) -> ProbeError {
    let kind = if error.is_access_fault() {
        FaultKind::Access
    } else {
        FaultKind::Data
    };
    ProbeError::new(kind, tag, format!("store {tag} failed")).caused_by(error)
}

/// Outcome history of periodic probes.
pub struct HealthTracker {
    healthy: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU32,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    unhealthy_threshold: u32,
    last_errors: RwLock<Vec<ProbeError>>,
}

impl HealthTracker {
    /// Create a tracker that reports unhealthy after `unhealthy_threshold`
    /// consecutive failed probes.
    #[must_use]
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            unhealthy_threshold: unhealthy_threshold.max(1),
            last_errors: RwLock::new(Vec::new()),
        }
    }

    /// Record the result of one probe.
    pub fn record(&self, errors: &[ProbeError]) {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);

        if errors.is_empty() {
            self.success_count.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.last_success_ms.store(now, Ordering::Relaxed);
            self.last_errors.write().clear();

            if !self.healthy.swap(true, Ordering::Relaxed) {
                info!("Store health recovered");
                crate::metrics::set_store_healthy(true);
            }
            return;
        }

        self.failure_count.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_ms.store(now, Ordering::Relaxed);
        *self.last_errors.write() = errors.to_vec();

        warn!(
            consecutive_failures = consecutive,
            faults = errors.len(),
            first = %errors[0].description,
            "Store health probe failed"
        );

        if consecutive >= self.unhealthy_threshold && self.healthy.swap(false, Ordering::Relaxed)
        {
            warn!(consecutive_failures = consecutive, "Store marked unhealthy");
            crate::metrics::set_store_healthy(false);
        }
    }

    /// Whether the store is currently considered healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Snapshot for the monitoring collaborator.
    #[must_use]
    pub fn report(&self) -> HealthReport {
        HealthReport {
            healthy: self.is_healthy(),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success_ms: self.last_success_ms.load(Ordering::Relaxed),
            last_failure_ms: self.last_failure_ms.load(Ordering::Relaxed),
            last_errors: self.last_errors.read().clone(),
        }
    }
}

/// Health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Current health status
    pub healthy: bool,
    /// Probes that passed
    pub success_count: u64,
    /// Probes that reported faults
    pub failure_count: u64,
    /// Failed probes since the last pass
    pub consecutive_failures: u32,
    /// Last passing probe (millis since epoch)
    pub last_success_ms: u64,
    /// Last failing probe (millis since epoch)
    pub last_failure_ms: u64,
    /// Faults from the most recent failing probe
    pub last_errors: Vec<ProbeError>,
}

/// Spawn a task that probes every `interval` and records into `tracker`.
///
/// Stops once every other owner of `tracker` has dropped it.
pub fn spawn_probe_task(
    prober: HealthProber,
    tracker: Arc<HealthTracker>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if Arc::strong_count(&tracker) <= 1 {
                debug!("Health tracker dropped, stopping probe task");
                break;
            }
            let errors = prober.ping().await;
            tracker.record(&errors);
        }
    })
}
