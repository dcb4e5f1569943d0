//! Per-user hourly notification cap.
//!
//! Within one limiter a slot is reserved before the send starts, so a burst
//! cannot get past the cap. Across processes the check and the increment are
//! separate steps against the shared counter, so concurrent dispatchers can
//! overshoot the limit by a small margin.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use pricewatch_core::{Clock, SystemClock, UserId};

pub const DEFAULT_MAX_PER_HOUR: u32 = 10;
pub const BUCKET_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Backend(String),
}

/// Shared counter storage with per-key expiry.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current value, 0 when absent or expired.
    async fn get(&self, key: &str) -> Result<u32, RateLimitError>;

    /// Increment and (re)set the key's time to live. Returns the new value.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u32, RateLimitError>;
}

/// In-memory counter store for tests/dev.
pub struct InMemoryRateLimitStore {
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<String, (u32, DateTime<Utc>)>>,
}

impl InMemoryRateLimitStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for InMemoryRateLimitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRateLimitStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, key: &str) -> Result<u32, RateLimitError> {
        let now = self.clock.now();
        let counters = self
            .counters
            .lock()
            .map_err(|_| RateLimitError::Backend("lock poisoned".to_string()))?;
        Ok(match counters.get(key) {
            Some((count, expires_at)) if *expires_at > now => *count,
            _ => 0,
        })
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u32, RateLimitError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| RateLimitError::Backend("lock poisoned".to_string()))?;

        let entry = counters.entry(key.to_string()).or_insert((0, now));
        if entry.1 <= now {
            entry.0 = 0;
        }
        entry.0 += 1;
        entry.1 = now + ttl;
        Ok(entry.0)
    }
}

/// Caps notifications per user per UTC hour bucket.
///
/// Clones share the in-flight reservations.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    max_per_hour: u32,
    in_flight: Arc<Mutex<HashMap<UserId, u32>>>,
    reserve_gate: Arc<AsyncMutex<()>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_per_hour", &self.max_per_hour)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>, max_per_hour: u32) -> Self {
        Self {
            store,
            clock,
            max_per_hour,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            reserve_gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn max_per_hour(&self) -> u32 {
        self.max_per_hour
    }

    /// `rate_limit:user:<userId>:hour:<yyyy-MM-dd-HH>`
    pub fn bucket_key(user_id: UserId, at: DateTime<Utc>) -> String {
        format!("rate_limit:user:{user_id}:hour:{}", at.format("%Y-%m-%d-%H"))
    }

    /// Whether another notification may go out to `user_id` this hour,
    /// counting sends that are reserved but not finished.
    ///
    /// Fails open: an unreachable counter store does not block notifications.
    pub async fn allows(&self, user_id: UserId) -> bool {
        let pending = self.pending(user_id);
        match self.current_count(user_id).await {
            Ok(count) => count.saturating_add(pending) < self.max_per_hour,
            Err(err) => {
                warn!(%user_id, error = %err, "rate limit check failed; allowing notification");
                true
            }
        }
    }

    /// Check and take a slot in one step. `None` when the user is at the cap.
    pub async fn reserve(&self, user_id: UserId) -> Option<Reservation> {
        let _gate = self.reserve_gate.lock().await;
        if !self.allows(user_id).await {
            return None;
        }
        *self.slots().entry(user_id).or_insert(0) += 1;
        Some(Reservation {
            limiter: self.clone(),
            user_id,
        })
    }

    /// Count one delivered notification against the current bucket.
    pub async fn record(&self, user_id: UserId) {
        let key = Self::bucket_key(user_id, self.clock.now());
        if let Err(err) = self.store.increment(&key, BUCKET_TTL).await {
            warn!(%user_id, error = %err, "failed to update rate limit counter");
        }
    }

    /// Notifications counted in the current hour bucket.
    pub async fn current_count(&self, user_id: UserId) -> Result<u32, RateLimitError> {
        let key = Self::bucket_key(user_id, self.clock.now());
        self.store.get(&key).await
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, u32>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self, user_id: UserId) -> u32 {
        self.slots().get(&user_id).copied().unwrap_or(0)
    }

    fn release(&self, user_id: UserId) {
        let mut slots = self.slots();
        if let Some(count) = slots.get_mut(&user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                slots.remove(&user_id);
            }
        }
    }
}

/// A slot taken from a user's hourly budget for a send in progress.
///
/// Dropping it without [`commit`](Self::commit) hands the slot back.
#[derive(Debug)]
pub struct Reservation {
    limiter: RateLimiter,
    user_id: UserId,
}

impl Reservation {
    /// Count the delivered notification. The slot is released afterwards.
    pub async fn commit(self) {
        self.limiter.record(self.user_id).await;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.limiter.release(self.user_id);
    }
}
