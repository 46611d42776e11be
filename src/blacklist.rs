//! Deny-list of revoked credentials.
//!
//! Entries always carry a bounded TTL so the list shrinks on its own: a
//! revoked token only needs to stay listed until it would have expired anyway.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::config::BlacklistConfig;

/// Namespace for deny-list entries in the shared store.
pub const KEY_PREFIX: &str = "blacklist:";

/// Store key for a deny-listed identifier.
#[must_use]
pub fn blacklist_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// TTL-bounded deny-list.
#[derive(Clone)]
pub struct Blacklist {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    max_ttl: Duration,
}

impl Blacklist {
    /// Create a deny-list over `store` on the system clock.
    pub fn new(store: Arc<dyn CacheStore>, config: &BlacklistConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a deny-list whose token lifetimes are measured on `clock`.
    /// Must be the clock the store expires entries by.
    pub fn with_clock(
        store: Arc<dyn CacheStore>,
        config: &BlacklistConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            max_ttl: config.max_ttl,
        }
    }

    /// List `key` for `ttl`, capped at the configured maximum.
    ///
    /// A zero TTL is refused: listing forever is never allowed and listing for
    /// nothing is a no-op. Returns whether the entry was written.
    pub fn put_on_blacklist(&self, key: &str, value: Value, ttl: Duration) -> bool {
        if ttl.is_zero() {
            debug!(key, "Refusing deny-list entry without a TTL");
            return false;
        }
        let ttl = ttl.min(self.max_ttl);
        match self.store.put(&blacklist_key(key), value, Some(ttl)) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to write deny-list entry");
                false
            }
        }
    }

    /// Whether `key` is currently listed.
    ///
    /// Fails closed: if the store cannot answer, the key is treated as listed.
    pub fn is_on_blacklist(&self, key: &str) -> bool {
        match self.store.get(&blacklist_key(key)) {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(key, error = %e, "Deny-list lookup failed, treating as listed");
                true
            }
        }
    }

    /// Lift a listing early. Returns whether a live entry was removed.
    pub fn remove_from_blacklist(&self, key: &str) -> bool {
        match self.store.delete(&blacklist_key(key)) {
            Ok(previous) => previous.is_some(),
            Err(e) => {
                warn!(key, error = %e, "Failed to remove deny-list entry");
                false
            }
        }
    }

    /// Revoke a token until its natural expiry.
    ///
    /// Returns `false` without writing anything when the token has already
    /// expired, since it is rejected on expiry alone.
    pub fn revoke_token(&self, token_id: &str, expires_at: DateTime<Utc>) -> bool {
        let now = self.clock.now_millis();
        let remaining = expires_at.timestamp_millis().saturating_sub(now);
        let Ok(remaining) = u64::try_from(remaining) else {
            debug!(token_id, "Token already expired, nothing to revoke");
            return false;
        };
        let value = serde_json::json!({ "revoked_at_ms": now });
        self.put_on_blacklist(token_id, value, Duration::from_millis(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::clock::ManualClock;
    use crate::error::{Error, Result};
    use serde_json::json;

    fn deny_list() -> (Arc<ManualClock>, Arc<LocalBackend>, Blacklist) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(LocalBackend::with_clock(clock.clone()));
        let list = Blacklist::with_clock(
            store.clone(),
            &BlacklistConfig {
                max_ttl: Duration::from_secs(3600),
            },
            clock.clone(),
        );
        (clock, store, list)
    }

    #[test]
    fn listed_until_ttl() {
        let (clock, _store, list) = deny_list();
        assert!(list.put_on_blacklist("jti-1", json!(true), Duration::from_secs(10)));
        assert!(list.is_on_blacklist("jti-1"));
        assert!(!list.is_on_blacklist("jti-2"));

        clock.advance(Duration::from_secs(10));
        assert!(!list.is_on_blacklist("jti-1"));
    }

    #[test]
    fn zero_ttl_is_refused() {
        let (_clock, store, list) = deny_list();
        assert!(!list.put_on_blacklist("jti", json!(true), Duration::ZERO));
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn ttl_is_capped() {
        let (clock, _store, list) = deny_list();
        assert!(list.put_on_blacklist("jti", json!(true), Duration::from_secs(10 * 3600)));
        clock.advance(Duration::from_secs(3600));
        assert!(!list.is_on_blacklist("jti"));
    }

    #[test]
    fn entries_are_namespaced() {
        let (_clock, store, list) = deny_list();
        list.put_on_blacklist("abc", json!(1), Duration::from_secs(5));
        assert_eq!(store.get("blacklist:abc").unwrap(), Some(json!(1)));
        assert_eq!(store.get("abc").unwrap(), None);
    }

    #[test]
    fn remove_lifts_listing() {
        let (_clock, _store, list) = deny_list();
        list.put_on_blacklist("jti", json!(true), Duration::from_secs(5));
        assert!(list.remove_from_blacklist("jti"));
        assert!(!list.is_on_blacklist("jti"));
        assert!(!list.remove_from_blacklist("jti"));
    }

    #[test]
    fn revoke_token_uses_remaining_lifetime() {
        let store = Arc::new(LocalBackend::new());
        let list = Blacklist::new(store, &BlacklistConfig::default());

        let live = Utc::now() + chrono::Duration::minutes(15);
        assert!(list.revoke_token("live-jti", live));
        assert!(list.is_on_blacklist("live-jti"));

        let expired = Utc::now() - chrono::Duration::minutes(1);
        assert!(!list.revoke_token("old-jti", expired));
        assert!(!list.is_on_blacklist("old-jti"));
    }

    #[test]
    fn revoked_token_follows_store_clock() {
        // GIVEN: a store clock far from wall-clock time
        let (clock, _store, list) = deny_list();
        clock.set(1_000_000);
        let expires_at = DateTime::from_timestamp_millis(1_000_000 + 90_000).unwrap();

        // WHEN: revoking a token with 90s of life left on that clock
        assert!(list.revoke_token("jti", expires_at));

        // THEN: listed until exactly that instant
        clock.advance(Duration::from_millis(89_999));
        assert!(list.is_on_blacklist("jti"));
        clock.advance(Duration::from_millis(1));
        assert!(!list.is_on_blacklist("jti"));

        // AND: a token expiring now is not written at all
        let now = DateTime::from_timestamp_millis(clock.now_millis()).unwrap();
        assert!(!list.revoke_token("stale", now));
    }

    struct Unreachable;

    impl CacheStore for Unreachable {
        fn put(&self, _: &str, _: Value, _: Option<Duration>) -> Result<()> {
            Err(Error::access("connection refused"))
        }
        fn get(&self, _: &str) -> Result<Option<Value>> {
            Err(Error::access("connection refused"))
        }
        fn delete(&self, _: &str) -> Result<Option<Value>> {
            Err(Error::access("connection refused"))
        }
        fn sweep(&self) -> Result<usize> {
            Err(Error::access("connection refused"))
        }
    }

    #[test]
    fn unreachable_store_fails_closed() {
        let list = Blacklist::new(Arc::new(Unreachable), &BlacklistConfig::default());
        assert!(!list.put_on_blacklist("jti", json!(true), Duration::from_secs(5)));
        assert!(list.is_on_blacklist("jti"));
        assert!(!list.remove_from_blacklist("jti"));
    }
}
