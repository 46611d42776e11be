//! Flash-sale quota admission.
//!
//! Guards a finite inventory against overselling under concurrent demand.
//! Each item moves through `Uninitialized → Enabled ⇄ Disabled`, and back to
//! `Uninitialized` only through an explicit operator reset.
//!
//! # Admission
//!
//! An acquisition confirms `min(request, limit, total - booked)` units and
//! books them in the same atomic step. Callers that need more than was
//! confirmed must ask again, and the next call sees the depleted remainder,
//! so `booked` can never pass `total`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::QuotaStore;

/// Per-item inventory counter.
///
/// Invariant: `0 <= booked <= total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCounter {
    /// Item identifier
    pub item_id: String,
    /// Whether acquisitions are currently admitted
    pub enabled: bool,
    /// Total units on sale
    pub total: i64,
    /// Maximum units confirmed by one acquisition
    pub limit: i64,
    /// Units currently reserved
    pub booked: i64,
}

impl InventoryCounter {
    /// A fresh, disabled counter with nothing booked.
    #[must_use]
    pub fn new(item_id: &str, total: i64, limit: i64) -> Self {
        Self {
            item_id: item_id.to_string(),
            enabled: false,
            total,
            limit,
            booked: 0,
        }
    }

    /// Units still available.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        (self.total - self.booked).max(0)
    }

    /// Confirm and book up to `request` units. Must run under the store's
    /// per-key critical section.
    pub fn acquire(&mut self, request: i64) -> i64 {
        if !self.enabled || request <= 0 {
            return 0;
        }
        let confirmed = confirm_amount(request, self.limit, self.total, self.booked);
        self.booked += confirmed;
        confirmed
    }

    /// Return `amount` units, flooring `booked` at zero. Non-positive amounts
    /// leave the counter untouched. Returns the new `booked`.
    pub fn revoke(&mut self, amount: i64) -> i64 {
        if amount > 0 {
            self.booked = self.booked.saturating_sub(amount).max(0);
        }
        self.booked
    }
}

/// `min(request, limit, total - booked)`, clamped to `>= 0`.
#[must_use]
pub fn confirm_amount(request: i64, limit: i64, total: i64, booked: i64) -> i64 {
    request.min(limit).min(total - booked).max(0)
}

/// Admission state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    /// No counter exists
    Uninitialized,
    /// Acquisitions are admitted
    Enabled,
    /// Counter exists but acquisitions return zero
    Disabled,
}

/// Point-in-time inventory snapshot for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    /// Item identifier
    pub item_id: String,
    /// Admission state
    pub status: InventoryStatus,
    /// Total units on sale
    pub total: i64,
    /// Per-acquisition cap
    pub limit: i64,
    /// Units reserved
    pub booked: i64,
    /// Units still available
    pub remaining: i64,
}

impl InventoryReport {
    fn uninitialized(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            status: InventoryStatus::Uninitialized,
            total: 0,
            limit: 0,
            booked: 0,
            remaining: 0,
        }
    }
}

impl From<InventoryCounter> for InventoryReport {
    fn from(counter: InventoryCounter) -> Self {
        let remaining = counter.remaining();
        Self {
            status: if counter.enabled {
                InventoryStatus::Enabled
            } else {
                InventoryStatus::Disabled
            },
            item_id: counter.item_id,
            total: counter.total,
            limit: counter.limit,
            booked: counter.booked,
            remaining,
        }
    }
}

/// Flash-sale admission controller.
///
/// Store failures are logged and reported as "nothing admitted" so order
/// handling never has to deal with a backend error.
#[derive(Clone)]
pub struct FlashSale {
    store: Arc<dyn QuotaStore>,
}

impl FlashSale {
    /// Create a controller over `store`.
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Create the counter for `item_id` (disabled, nothing booked).
    ///
    /// Returns `false` if the item already exists; re-initialisation requires
    /// [`FlashSale::inventory_reset`] first so an in-flight sale is never wiped.
    pub fn inventory_init(&self, item_id: &str, total: i64, limit: i64) -> bool {
        if total < 0 || limit < 0 {
            warn!(item = item_id, total, limit, "Rejected inventory with negative bounds");
            return false;
        }
        match self.store.init(item_id, total, limit) {
            Ok(true) => {
                info!(item = item_id, total, limit, "Flash-sale inventory initialised");
                true
            }
            Ok(false) => {
                warn!(item = item_id, "Flash-sale inventory already initialised");
                false
            }
            Err(e) => {
                warn!(item = item_id, error = %e, "Flash-sale inventory init failed");
                false
            }
        }
    }

    /// Open or close admission without touching the counters.
    ///
    /// Returns `false` if the item is not initialised.
    pub fn enable(&self, item_id: &str, enabled: bool) -> bool {
        match self.store.set_enabled(item_id, enabled) {
            Ok(true) => {
                info!(item = item_id, enabled, "Flash-sale admission toggled");
                true
            }
            Ok(false) => {
                debug!(item = item_id, "Cannot toggle uninitialised item");
                false
            }
            Err(e) => {
                warn!(item = item_id, error = %e, "Flash-sale toggle failed");
                false
            }
        }
    }

    /// Confirm up to `request` units. Returns how many were confirmed, which
    /// is zero when the item is disabled, unknown or sold out.
    pub fn acquire_quota(&self, item_id: &str, request: i64) -> i64 {
        if request <= 0 {
            return 0;
        }
        let confirmed = match self.store.acquire(item_id, request) {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(item = item_id, request, error = %e, "Quota acquisition failed");
                0
            }
        };
        crate::metrics::record_quota_acquire(item_id, request, confirmed);
        if confirmed < request {
            debug!(item = item_id, request, confirmed, "Quota partially filled");
        }
        confirmed
    }

    /// Return `amount` reserved units, e.g. for an order that was not paid in
    /// time. Returns the new booked count (zero for unknown items).
    pub fn revoke_quota(&self, item_id: &str, amount: i64) -> i64 {
        match self.store.revoke(item_id, amount) {
            Ok(Some(booked)) => {
                crate::metrics::record_quota_revoke(item_id, amount);
                debug!(item = item_id, amount, booked, "Quota revoked");
                booked
            }
            Ok(None) => {
                debug!(item = item_id, "Revoke on uninitialised item");
                0
            }
            Err(e) => {
                warn!(item = item_id, amount, error = %e, "Quota revoke failed");
                0
            }
        }
    }

    /// Snapshot of the item's counter.
    pub fn inventory_report(&self, item_id: &str) -> InventoryReport {
        match self.store.report(item_id) {
            Ok(Some(counter)) => counter.into(),
            Ok(None) => InventoryReport::uninitialized(item_id),
            Err(e) => {
                warn!(item = item_id, error = %e, "Inventory report failed");
                InventoryReport::uninitialized(item_id)
            }
        }
    }

    /// Operator reset back to `Uninitialized`, discarding the booked count.
    pub fn inventory_reset(&self, item_id: &str) -> bool {
        match self.store.reset(item_id) {
            Ok(removed) => {
                if removed {
                    info!(item = item_id, "Flash-sale inventory reset");
                }
                removed
            }
            Err(e) => {
                warn!(item = item_id, error = %e, "Inventory reset failed");
                false
            }
        }
    }
}
