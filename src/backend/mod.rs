//! Backing-store contract and the in-process reference implementation.
//!
//! Any store that coordinates Gatekeeper state must provide three narrow
//! capabilities:
//!
//! - [`CacheStore`]: TTL key/value entries (cache and deny-list)
//! - [`LockStore`]: linearizable create-if-absent locks with owner tokens
//! - [`QuotaStore`]: atomic fetch-and-add-with-clamp inventory counters
//!
//! Every method is single-key atomic. Methods return [`crate::Result`] so a
//! remote store can report that it could not complete an operation; a denied
//! request (lock held elsewhere, inventory depleted) is a normal `Ok` value.

mod local;

pub use local::{CacheEntry, LocalBackend, LockRecord};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::Result;
use crate::flashsale::InventoryCounter;

/// TTL key/value storage.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// `ttl == None` stores the entry forever.
    fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Return the live value for `key`; expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Remove `key`, returning what [`CacheStore::get`] would have returned.
    fn delete(&self, key: &str) -> Result<Option<Value>>;

    /// Physically remove expired entries. Returns how many were removed.
    fn sweep(&self) -> Result<usize>;
}

/// Named mutual exclusion with owner tokens and hard expiry.
pub trait LockStore: Send + Sync {
    /// Create the lock iff no unexpired record exists for `name`. Never waits.
    fn try_lock(&self, name: &str, owner_token: &str, ttl: Duration) -> Result<bool>;

    /// Remove the lock iff it is unexpired and held by `owner_token`.
    fn unlock(&self, name: &str, owner_token: &str) -> Result<bool>;
}

/// Bounded inventory counters for flash-sale admission.
pub trait QuotaStore: Send + Sync {
    /// Create a disabled counter with `booked = 0`. `false` if one already exists.
    fn init(&self, item_id: &str, total: i64, limit: i64) -> Result<bool>;

    /// Toggle admission. `false` if the item is not initialised.
    fn set_enabled(&self, item_id: &str, enabled: bool) -> Result<bool>;

    /// Atomically confirm and book up to `amount` units.
    fn acquire(&self, item_id: &str, amount: i64) -> Result<i64>;

    /// Atomically return `amount` booked units, floored at zero.
    ///
    /// `None` if the item is not initialised.
    fn revoke(&self, item_id: &str, amount: i64) -> Result<Option<i64>>;

    /// Snapshot of the counter from a single atomic read.
    fn report(&self, item_id: &str) -> Result<Option<InventoryCounter>>;

    /// Drop the counter so the item can be initialised again.
    fn reset(&self, item_id: &str) -> Result<bool>;
}

/// Store statistics tracked atomically
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Reads served from a live entry
    pub hits: AtomicU64,
    /// Reads of absent or expired keys
    pub misses: AtomicU64,
    /// Expired entries and locks physically removed
    pub evictions: AtomicU64,
}

impl StoreStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Hit rate as a fraction (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Snapshot of store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatsSnapshot {
    /// Total hits
    pub hits: u64,
    /// Total misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Cache entries currently held (live or awaiting sweep)
    pub entries: usize,
    /// Lock records currently held (live or awaiting sweep)
    pub locks: usize,
    /// Initialised inventory counters
    pub items: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// Spawn a background tokio task that periodically sweeps expired entries
/// out of `store`.
///
/// The task runs every `interval` and stops once every other owner of the
/// `Arc` has dropped it.
pub fn spawn_sweep_task<S>(store: Arc<S>, interval: Duration) -> JoinHandle<()>
where
    S: CacheStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if Arc::strong_count(&store) <= 1 {
                debug!("Store dropped, stopping sweep task");
                break;
            }
            match store.sweep() {
                Ok(0) => {}
                Ok(removed) => {
                    crate::metrics::record_sweep(removed);
                    debug!(removed, "Swept expired entries");
                }
                Err(e) => tracing::warn!(error = %e, "Sweep failed"),
            }
        }
    })
}
