//! Duplicate-alert suppression built on the lock primitive.
//!
//! The first caller inside a window acquires a lock whose TTL is the window;
//! everyone else in that window fails to acquire and is told to suppress.
//! Debounce locks are never unlocked; they clear themselves at expiry.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::LockStore;
use crate::config::DebounceConfig;
use crate::lock::OwnerToken;

/// Namespace for debounce locks so they never collide with ordinary locks.
pub const KEY_PREFIX: &str = "debounce:";

/// Derive the debounce key for an alert.
///
/// The key hashes `title` and the optional root-cause type name with a NUL
/// separator, so two different root causes under the same title are
/// separate keys and one recent alert does not mask an unrelated failure.
#[must_use]
pub fn alert_key(title: &str, root_cause: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\0");
    if let Some(cause) = root_cause {
        hasher.update(cause.as_bytes());
    }
    format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Suppresses repeated actions for a key inside a time window.
#[derive(Clone)]
pub struct DebounceGuard {
    store: Arc<dyn LockStore>,
    default_window_minutes: u64,
}

impl DebounceGuard {
    /// Create a guard over `store`.
    pub fn new(store: Arc<dyn LockStore>, config: &DebounceConfig) -> Self {
        Self {
            store,
            default_window_minutes: config.window_minutes,
        }
    }

    /// Returns `true` when the action was already performed inside the last
    /// `window_minutes` and should be suppressed.
    ///
    /// A store failure reads as "not suppressed": a duplicate alert is
    /// preferable to a lost one.
    pub fn debounce(&self, key: &str, owner_token: &str, window_minutes: u64) -> bool {
        let window = Duration::from_secs(window_minutes.saturating_mul(60));
        let suppressed = match self.store.try_lock(key, owner_token, window) {
            Ok(acquired) => !acquired,
            Err(e) => {
                tracing::warn!(key, error = %e, "Debounce check failed, letting action through");
                false
            }
        };
        if suppressed {
            crate::metrics::record_debounce_suppressed();
            debug!(key, window_minutes, "Suppressed duplicate action");
        }
        suppressed
    }

    /// Debounce an alert by title and root cause using the configured window.
    pub fn should_suppress_alert(&self, title: &str, root_cause: Option<&str>) -> bool {
        let token = OwnerToken::generate();
        self.debounce(
            &alert_key(title, root_cause),
            token.as_str(),
            self.default_window_minutes,
        )
    }
}
