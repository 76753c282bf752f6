//! Rate limiting abstraction for simulated quota errors.

use async_trait::async_trait;

use crate::error::ApiError;

/// Trait for rate limiting by a given key (platform plus caller).
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Attempts to consume one request for the specified key.
    /// Returns Ok(true) if allowed, Ok(false) if rate-limited, or Err on internal error.
    async fn consume(&self, key: &str) -> Result<bool, ApiError>;
}
