//! Named locks with owner tokens and hard expiry.
//!
//! [`Locks::try_lock`] never waits. Expiry is the only recovery for an owner
//! that crashes or hangs, so callers size the TTL above their critical section
//! with margin; there is no renewal. [`Locks::acquire_with_retry`] layers an
//! exponential backoff on top for callers that want to wait.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::backend::LockStore;
use crate::config::{LockConfig, LockRetryConfig};

/// Practically unique lock owner identity: `{pid}-{thread}-{random}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Generate a token for the calling thread.
    #[must_use]
    pub fn generate() -> Self {
        let thread: String = format!("{:?}", std::thread::current().id())
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        Self(format!(
            "{}-{}-{}",
            std::process::id(),
            thread,
            Uuid::new_v4().simple()
        ))
    }

    /// The token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OwnerToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl AsRef<str> for OwnerToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lock façade: store failures read as "not acquired" / "not released".
#[derive(Clone)]
pub struct Locks {
    store: Arc<dyn LockStore>,
    default_ttl: Duration,
    retry: LockRetryConfig,
}

impl Locks {
    /// Create a lock façade over `store`.
    pub fn new(store: Arc<dyn LockStore>, config: &LockConfig) -> Self {
        Self {
            store,
            default_ttl: config.default_ttl,
            retry: config.retry.clone(),
        }
    }

    /// Acquire `name` for `owner_token` iff nobody holds an unexpired lock.
    #[tracing::instrument(level = "trace", skip(self, owner_token))]
    pub fn try_lock(&self, name: &str, owner_token: &str, ttl: Duration) -> bool {
        let acquired = match self.store.try_lock(name, owner_token, ttl) {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(lock = name, error = %e, "Lock acquisition failed");
                false
            }
        };
        crate::metrics::record_lock_attempt(acquired);
        acquired
    }

    /// Release `name` iff it is still held by `owner_token`.
    pub fn unlock(&self, name: &str, owner_token: &str) -> bool {
        match self.store.unlock(name, owner_token) {
            Ok(released) => released,
            Err(e) => {
                warn!(lock = name, error = %e, "Lock release failed");
                false
            }
        }
    }

    /// Try once with a fresh token and the configured default TTL.
    pub fn acquire(&self, name: &str) -> Option<LockGuard> {
        self.acquire_for(name, self.default_ttl)
    }

    /// Try once with a fresh token and `ttl`.
    pub fn acquire_for(&self, name: &str, ttl: Duration) -> Option<LockGuard> {
        let token = OwnerToken::generate();
        self.try_lock(name, token.as_str(), ttl)
            .then(|| self.guard(name, token))
    }

    /// Keep trying with exponential backoff until acquired or the configured
    /// attempts run out.
    pub async fn acquire_with_retry(&self, name: &str, ttl: Duration) -> Option<LockGuard> {
        if !self.retry.enabled {
            return self.acquire_for(name, ttl);
        }

        let token = OwnerToken::generate();
        let token_str = token.as_str();
        let locks = self;
        let attempt = || async move {
            if locks.try_lock(name, token_str, ttl) {
                Ok(())
            } else {
                Err(Contended)
            }
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.initial_backoff)
            .with_max_delay(self.retry.max_backoff)
            .with_factor(self.retry.multiplier)
            .with_max_times(self.retry.max_attempts)
            .with_jitter();

        let result = attempt
            .retry(backoff)
            .notify(|_: &Contended, delay: Duration| {
                trace!(lock = name, delay_ms = delay.as_millis(), "Lock busy, backing off");
            })
            .await;

        match result {
            Ok(()) => Some(self.guard(name, token)),
            Err(Contended) => {
                debug!(lock = name, "Gave up waiting for lock");
                None
            }
        }
    }

    fn guard(&self, name: &str, token: OwnerToken) -> LockGuard {
        LockGuard {
            store: Arc::clone(&self.store),
            name: name.to_string(),
            token,
            released: false,
        }
    }
}

#[derive(Debug)]
struct Contended;

/// A held lock, released on drop.
///
/// If the lock already expired (and possibly went to another owner) the
/// release is refused by the store and logged; it never panics.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    name: String,
    token: OwnerToken,
    released: bool,
}

impl LockGuard {
    /// Lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token this guard holds the lock with.
    #[must_use]
    pub fn token(&self) -> &OwnerToken {
        &self.token
    }

    /// Release now and report whether this guard still owned the lock.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.unlock()
    }

    fn unlock(&self) -> bool {
        match self.store.unlock(&self.name, self.token.as_str()) {
            Ok(true) => {
                trace!(lock = %self.name, "Lock released");
                true
            }
            Ok(false) => {
                warn!(lock = %self.name, "Lock expired before release");
                false
            }
            Err(e) => {
                warn!(lock = %self.name, error = %e, "Lock release failed");
                false
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.unlock();
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
