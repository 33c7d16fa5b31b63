//! In-memory cache for short-lived registry tokens.
//!
//! Each key owns a slot guarded by an async mutex. A caller that finds the
//! slot empty or expired refreshes it while holding the lock, so concurrent
//! callers for the same key wait for that one exchange instead of starting
//! their own. Slots are evicted least-recently-used.

use crate::error::Result;
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;


/// Default number of cached keys.
pub const DEFAULT_CAPACITY: usize = 256;

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(5);

/// A token together with the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Creates a token valid for `ttl` from now.
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// True while the token has more than the safety margin left.
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

type Slot = Arc<AsyncMutex<Option<CachedToken>>>;

/// Shared token cache with single-flight refresh.
#[derive(Debug)]
pub struct TokenCache {
    slots: Mutex<LruCache<String, Slot>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl TokenCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached token for `key`, or runs `refresh` to obtain one.
    ///
    /// At most one `refresh` runs per key at a time. A failed refresh leaves
    /// the slot empty and the error is returned to this caller only; the next
    /// waiter tries again.
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(token) = guard.as_ref()
            && token.is_fresh()
        {
            return Ok(token.value.clone());
        }

        debug!(key, "Refreshing cached token");
        *guard = None;
        let token = refresh().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// Drops the token stored for `key`, if any.
    pub fn invalidate(&self, key: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(key);
    }

    /// Number of keys currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.put(key.to_string(), Arc::clone(&slot));
        slot
    }
}
