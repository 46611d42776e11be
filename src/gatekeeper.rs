//! Composition root.
//!
//! [`Gatekeeper`] wires the capability stores into the lock, debounce,
//! deny-list, flash-sale and health components. It is constructed explicitly
//! and handed to whoever needs it; there is no process-wide instance.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{
    CacheStore, LocalBackend, LockStore, QuotaStore, StoreStatsSnapshot, spawn_sweep_task,
};
use crate::blacklist::Blacklist;
use crate::clock::{Clock, SystemClock, ttl_from_secs};
use crate::config::Config;
use crate::debounce::DebounceGuard;
use crate::flashsale::{FlashSale, InventoryReport};
use crate::health::{HealthProber, HealthReport, HealthTracker, ProbeError, spawn_probe_task};
use crate::lock::Locks;

/// Cache and admission-control coordination layer.
#[derive(Clone)]
pub struct Gatekeeper {
    config: Config,
    cache: Arc<dyn CacheStore>,
    local: Option<Arc<LocalBackend>>,
    locks: Locks,
    debounce: DebounceGuard,
    blacklist: Blacklist,
    flashsale: FlashSale,
    prober: HealthProber,
    health: Arc<HealthTracker>,
}

impl Gatekeeper {
    /// Build on a fresh in-process backend.
    pub fn local(config: Config) -> Self {
        Self::local_with_clock(config, Arc::new(SystemClock))
    }

    /// Build on a fresh in-process backend reading time from `clock`.
    pub fn local_with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(LocalBackend::with_clock(Arc::clone(&clock)));
        let mut gatekeeper = Self::build(
            config,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            clock,
        );
        gatekeeper.local = Some(backend);
        gatekeeper
    }

    /// Build on caller-supplied stores, e.g. a shared remote backend.
    pub fn with_stores(
        config: Config,
        cache: Arc<dyn CacheStore>,
        locks: Arc<dyn LockStore>,
        quota: Arc<dyn QuotaStore>,
    ) -> Self {
        Self::build(config, cache, locks, quota, Arc::new(SystemClock))
    }

    fn build(
        config: Config,
        cache: Arc<dyn CacheStore>,
        locks: Arc<dyn LockStore>,
        quota: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            locks: Locks::new(Arc::clone(&locks), &config.lock),
            debounce: DebounceGuard::new(locks, &config.debounce),
            blacklist: Blacklist::with_clock(Arc::clone(&cache), &config.blacklist, clock),
            flashsale: FlashSale::new(quota),
            prober: HealthProber::new(Arc::clone(&cache), &config.health),
            health: Arc::new(HealthTracker::new(config.health.unhealthy_threshold)),
            local: None,
            cache,
            config,
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── TTL entries ───────────────────────────────────────────────────────────

    /// Store `value`; `ttl == None` keeps it forever. Returns whether it was written.
    pub fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        match self.cache.put(key, value, ttl) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache put failed");
                false
            }
        }
    }

    /// Store `value` for `ttl_seconds`; a negative TTL keeps it forever.
    pub fn put_with_ttl_secs(&self, key: &str, value: Value, ttl_seconds: i64) -> bool {
        self.put(key, value, ttl_from_secs(ttl_seconds))
    }

    /// Live value for `key`, or `None` if absent, expired or unreadable.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache get failed");
            None
        })
    }

    /// Remove `key`, returning its live value.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.cache.delete(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Cache delete failed");
            None
        })
    }

    // ── Locks & debounce ──────────────────────────────────────────────────────

    /// Non-blocking lock acquisition.
    pub fn try_lock(&self, name: &str, owner_token: &str, ttl: Duration) -> bool {
        self.locks.try_lock(name, owner_token, ttl)
    }

    /// Owner-checked release.
    pub fn unlock(&self, name: &str, owner_token: &str) -> bool {
        self.locks.unlock(name, owner_token)
    }

    /// `true` when the action behind `key` already ran in the last `window_minutes`.
    pub fn debounce(&self, key: &str, owner_token: &str, window_minutes: u64) -> bool {
        self.debounce.debounce(key, owner_token, window_minutes)
    }

    /// Lock façade with guards and retrying acquisition.
    pub fn locks(&self) -> &Locks {
        &self.locks
    }

    /// Alert debouncing.
    pub fn debounce_guard(&self) -> &DebounceGuard {
        &self.debounce
    }

    // ── Deny-list ─────────────────────────────────────────────────────────────

    /// List `key` for a bounded `ttl`.
    pub fn put_on_blacklist(&self, key: &str, value: Value, ttl: Duration) -> bool {
        self.blacklist.put_on_blacklist(key, value, ttl)
    }

    /// Whether `key` is currently listed.
    pub fn is_on_blacklist(&self, key: &str) -> bool {
        self.blacklist.is_on_blacklist(key)
    }

    /// Deny-list with token revocation helpers.
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    // ── Flash sale ────────────────────────────────────────────────────────────

    /// Create a disabled inventory counter.
    pub fn flashsale_inventory_init(&self, item_id: &str, total: i64, limit: i64) -> bool {
        self.flashsale.inventory_init(item_id, total, limit)
    }

    /// Open or close admission for an item.
    pub fn flashsale_enable(&self, item_id: &str, enabled: bool) -> bool {
        self.flashsale.enable(item_id, enabled)
    }

    /// Confirm up to `request_amount` units.
    pub fn flashsale_acquire_quota(&self, item_id: &str, request_amount: i64) -> i64 {
        self.flashsale.acquire_quota(item_id, request_amount)
    }

    /// Return reserved units; yields the new booked count.
    pub fn flashsale_revoke_quota(&self, item_id: &str, request_amount: i64) -> i64 {
        self.flashsale.revoke_quota(item_id, request_amount)
    }

    /// Point-in-time inventory snapshot.
    pub fn flashsale_inventory_report(&self, item_id: &str) -> InventoryReport {
        self.flashsale.inventory_report(item_id)
    }

    /// Operator reset back to uninitialised.
    pub fn flashsale_inventory_reset(&self, item_id: &str) -> bool {
        self.flashsale.inventory_reset(item_id)
    }

    /// Flash-sale controller.
    pub fn flashsale(&self) -> &FlashSale {
        &self.flashsale
    }

    /// Initialise (and optionally open) the items listed in the configuration.
    /// Items that already exist are left untouched. Returns how many were created.
    pub fn init_configured_items(&self) -> usize {
        let mut created = 0;
        for item in &self.config.flashsale.items {
            if self.flashsale.inventory_init(&item.item_id, item.total, item.limit) {
                created += 1;
                if item.enabled {
                    self.flashsale.enable(&item.item_id, true);
                }
            }
        }
        created
    }

    // ── Health ────────────────────────────────────────────────────────────────

    /// Run one liveness probe.
    pub async fn ping(&self) -> Vec<ProbeError> {
        self.prober.ping().await
    }

    /// Outcome of the periodic probes.
    pub fn health_report(&self) -> HealthReport {
        self.health.report()
    }

    /// Store statistics, when running on the in-process backend.
    pub fn store_stats(&self) -> Option<StoreStatsSnapshot> {
        self.local.as_ref().map(|backend| backend.stats())
    }

    /// Start the sweep task and, if enabled, the periodic health probe.
    pub fn start_background(&self) -> BackgroundTasks {
        let sweep = spawn_sweep_task(Arc::clone(&self.cache), self.config.store.sweep_interval);
        let probe = self.config.health.enabled.then(|| {
            spawn_probe_task(
                self.prober.clone(),
                Arc::clone(&self.health),
                self.config.health.interval,
            )
        });
        info!(
            sweep_interval_ms = self.config.store.sweep_interval.as_millis(),
            health_probe = probe.is_some(),
            "Background tasks started"
        );
        BackgroundTasks { sweep, probe }
    }
}

/// Handles of the background tasks.
pub struct BackgroundTasks {
    sweep: JoinHandle<()>,
    probe: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Stop all background tasks.
    pub fn shutdown(self) {
        self.sweep.abort();
        if let Some(probe) = self.probe {
            probe.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FlashsaleItemConfig;
    use crate::flashsale::InventoryStatus;
    use serde_json::json;

    fn gatekeeper() -> (Arc<ManualClock>, Gatekeeper) {
        let clock = Arc::new(ManualClock::new(0));
        (clock.clone(), Gatekeeper::local_with_clock(Config::default(), clock))
    }

    #[test]
    fn cache_operations_respect_ttl() {
        let (clock, gk) = gatekeeper();
        assert!(gk.put("k", json!({"v": 1}), Some(Duration::from_secs(30))));
        assert_eq!(gk.get("k"), Some(json!({"v": 1})));
        clock.advance(Duration::from_secs(30));
        assert_eq!(gk.get("k"), None);
        assert_eq!(gk.delete("k"), None);
    }

    #[test]
    fn ttl_in_seconds_negative_means_forever() {
        let (clock, gk) = gatekeeper();
        assert!(gk.put_with_ttl_secs("short", json!("a"), 5));
        assert!(gk.put_with_ttl_secs("pinned", json!("b"), -1));

        clock.advance(Duration::from_secs(4));
        assert_eq!(gk.get("short"), Some(json!("a")));
        clock.advance(Duration::from_secs(1));
        assert_eq!(gk.get("short"), None);

        clock.advance(Duration::from_secs(30 * 24 * 3600));
        assert_eq!(gk.get("pinned"), Some(json!("b")));
    }

    #[test]
    fn debounce_then_suppress() {
        let (_clock, gk) = gatekeeper();
        assert!(!gk.debounce("alert", "me", 10));
        assert!(gk.debounce("alert", "me", 10));
    }

    #[test]
    fn locks_and_debounce_share_the_store() {
        // A debounce key is a lock; holding it blocks try_lock on the same name
        let (_clock, gk) = gatekeeper();
        assert!(!gk.debounce("shared", "a", 1));
        assert!(!gk.try_lock("shared", "b", Duration::from_secs(1)));
    }

    #[test]
    fn configured_items_are_initialised_once() {
        let clock = Arc::new(ManualClock::new(0));
        let mut config = Config::default();
        config.flashsale.items = vec![
            FlashsaleItemConfig {
                item_id: "open".into(),
                total: 10,
                limit: 2,
                enabled: true,
            },
            FlashsaleItemConfig {
                item_id: "closed".into(),
                total: 5,
                limit: 5,
                enabled: false,
            },
        ];
        let gk = Gatekeeper::local_with_clock(config, clock);

        assert_eq!(gk.init_configured_items(), 2);
        assert_eq!(gk.init_configured_items(), 0);
        assert_eq!(
            gk.flashsale_inventory_report("open").status,
            InventoryStatus::Enabled
        );
        assert_eq!(
            gk.flashsale_inventory_report("closed").status,
            InventoryStatus::Disabled
        );
        assert_eq!(gk.flashsale_acquire_quota("open", 5), 2);
    }

    #[test]
    fn stats_available_on_local_backend() {
        let (_clock, gk) = gatekeeper();
        gk.put("a", json!(1), None);
        gk.get("a");
        let stats = gk.store_stats().expect("local backend exposes stats");
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn background_sweep_evicts() {
        let mut config = Config::default();
        config.store.sweep_interval = Duration::from_millis(10);
        config.health.enabled = false;
        let gk = Gatekeeper::local(config);

        gk.put("short", json!(1), Some(Duration::from_millis(20)));
        let tasks = gk.start_background();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(gk.store_stats().unwrap().entries, 0);
        tasks.shutdown();
    }
}
