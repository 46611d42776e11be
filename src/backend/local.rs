//! In-process backend over sharded `DashMap`s.
//!
//! Each mutating operation runs under the write guard of the shard that owns
//! its key, which gives the single-key atomicity the store contract requires
//! without a global lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::trace;

use super::{CacheStore, LockStore, QuotaStore, StoreStats, StoreStatsSnapshot};
use crate::Result;
use crate::clock::{Clock, NEVER, SystemClock, expiry_after};
use crate::flashsale::InventoryCounter;

/// A stored value with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached JSON value
    pub value: Value,
    /// Expiry in epoch millis; [`NEVER`] for entries without a TTL
    pub expires_at_millis: i64,
}

impl CacheEntry {
    /// Whether the entry reads as absent at `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at_millis != NEVER && now >= self.expires_at_millis
    }
}

/// A held lock. Replaced on re-acquisition, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Lock name
    pub name: String,
    /// Token of the owner allowed to release it
    pub owner_token: String,
    /// Expiry in epoch millis
    pub expires_at_millis: i64,
}

impl LockRecord {
    /// Whether the lock has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at_millis
    }
}

/// Fully local backend for single-process deployments.
pub struct LocalBackend {
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, LockRecord>,
    inventory: DashMap<String, InventoryCounter>,
    clock: Arc<dyn Clock>,
    stats: StoreStats,
}

impl LocalBackend {
    /// Create an empty backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty backend reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            inventory: DashMap::new(),
            clock,
            stats: StoreStats::default(),
        }
    }

    /// Current lock record for `name`, if any (expired or not).
    #[must_use]
    pub fn lock_record(&self, name: &str) -> Option<LockRecord> {
        self.locks.get(name).map(|r| r.value().clone())
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStatsSnapshot {
        use std::sync::atomic::Ordering;

        StoreStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
            locks: self.locks.len(),
            items: self.inventory.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for LocalBackend {
    fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value,
            expires_at_millis: expiry_after(self.clock.now_millis(), ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
            Some(entry) if !entry.is_expired(now) => {
                self.stats.record_hit();
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }

        // Re-check under the shard write lock: a concurrent put may have
        // replaced the expired entry since the read above.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.stats.record_evictions(1);
            trace!(key, "Evicted expired entry on read");
        }
        self.stats.record_miss();
        Ok(None)
    }

    fn delete(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .remove(key)
            .and_then(|(_, entry)| (!entry.is_expired(now)).then_some(entry.value)))
    }

    fn sweep(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0usize;

        // retain only ever removes, and decides per entry under the shard
        // lock, so it cannot drop a fresher put or resurrect a deleted key.
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.locks.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        self.stats.record_evictions(removed);
        Ok(removed)
    }
}

impl LockStore for LocalBackend {
    fn try_lock(&self, name: &str, owner_token: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let record = LockRecord {
            name: name.to_string(),
            owner_token: owner_token.to_string(),
            expires_at_millis: expiry_after(now, Some(ttl)),
        };

        let acquired = match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().is_expired(now) {
                    held.insert(record);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        };
        Ok(acquired)
    }

    fn unlock(&self, name: &str, owner_token: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .locks
            .remove_if(name, |_, record| {
                !record.is_expired(now) && record.owner_token == owner_token
            })
            .is_some())
    }
}

impl QuotaStore for LocalBackend {
    fn init(&self, item_id: &str, total: i64, limit: i64) -> Result<bool> {
        match self.inventory.entry(item_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(InventoryCounter::new(item_id, total, limit));
                Ok(true)
            }
        }
    }

    fn set_enabled(&self, item_id: &str, enabled: bool) -> Result<bool> {
        Ok(self
            .inventory
            .get_mut(item_id)
            .map(|mut counter| counter.enabled = enabled)
            .is_some())
    }

    fn acquire(&self, item_id: &str, amount: i64) -> Result<i64> {
        // get_mut holds the shard write lock across compute-and-commit
        Ok(self
            .inventory
            .get_mut(item_id)
            .map_or(0, |mut counter| counter.acquire(amount)))
    }

    fn revoke(&self, item_id: &str, amount: i64) -> Result<Option<i64>> {
        Ok(self
            .inventory
            .get_mut(item_id)
            .map(|mut counter| counter.revoke(amount)))
    }

    fn report(&self, item_id: &str) -> Result<Option<InventoryCounter>> {
        Ok(self.inventory.get(item_id).map(|c| c.value().clone()))
    }

    fn reset(&self, item_id: &str) -> Result<bool> {
        Ok(self.inventory.remove(item_id).is_some())
    }
}
