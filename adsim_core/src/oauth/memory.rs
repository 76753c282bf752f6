//! In-memory default implementations for the OAuth traits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::provider::GrantStore;
use super::rate_limiter::RateLimiter;
use super::types::{AuthorizationGrant, Redemption, RefreshTokenRecord};
use crate::error::{ApiError, StoreError};

/// In-memory storage for authorization codes and refresh tokens.
///
/// Redemption happens under the DashMap shard lock of the key, which makes
/// the consumed/active flip atomic with respect to other threads.
#[derive(Clone, Default)]
pub struct InMemoryGrantStore {
    grants: Arc<DashMap<String, AuthorizationGrant>>,
    refresh_tokens: Arc<DashMap<String, RefreshTokenRecord>>,
}

impl InMemoryGrantStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn store_grant(&self, grant: AuthorizationGrant) -> Result<(), StoreError> {
        match self.grants.entry(grant.code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(grant.code)),
            Entry::Vacant(slot) => {
                slot.insert(grant);
                Ok(())
            }
        }
    }

    async fn get_grant(&self, code: &str) -> Result<Option<AuthorizationGrant>, StoreError> {
        Ok(self.grants.get(code).map(|entry| entry.value().clone()))
    }

    async fn redeem_grant(&self, code: &str) -> Result<Redemption<AuthorizationGrant>, StoreError> {
        let Some(mut entry) = self.grants.get_mut(code) else {
            return Ok(Redemption::Unknown);
        };
        if entry.consumed {
            return Ok(Redemption::AlreadyUsed(entry.clone()));
        }
        entry.consumed = true;
        Ok(Redemption::Redeemed(entry.clone()))
    }

    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        match self.refresh_tokens.entry(record.value.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(record.value)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get_refresh_token(&self, value: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.refresh_tokens.get(value).map(|entry| entry.value().clone()))
    }

    async fn redeem_refresh_token(&self, value: &str) -> Result<Redemption<RefreshTokenRecord>, StoreError> {
        let Some(mut entry) = self.refresh_tokens.get_mut(value) else {
            return Ok(Redemption::Unknown);
        };
        if !entry.active {
            return Ok(Redemption::AlreadyUsed(entry.clone()));
        }
        entry.active = false;
        Ok(Redemption::Redeemed(entry.clone()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.grants.clear();
        self.refresh_tokens.clear();
        Ok(())
    }
}

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter keyed by caller.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    windows: Arc<DashMap<String, Window>>,
    limit: u32,
    period: Duration,
}

impl InMemoryRateLimiter {
    /// Allows `limit` requests per key in every `period`.
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit,
            period,
        }
    }

    /// Allows `limit` requests per key per minute.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn consume(&self, key: &str) -> Result<bool, ApiError> {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window { started: now, count: 0 });
        if now.duration_since(window.started) >= self.period {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return Ok(false);
        }
        window.count += 1;
        Ok(true)
    }
}
