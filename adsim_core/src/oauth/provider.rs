//! Storage traits behind the grant engine.

use async_trait::async_trait;

use super::types::{AuthorizationGrant, Redemption, RefreshTokenRecord};
use crate::error::StoreError;

/// Trait to abstract storage of authorization codes and refresh tokens.
///
/// The redeem operations must be atomic per key: of several concurrent
/// callers, exactly one observes [`Redemption::Redeemed`].
#[async_trait]
pub trait GrantStore: Send + Sync + 'static {
    /// Store a freshly issued authorization code.
    async fn store_grant(&self, grant: AuthorizationGrant) -> Result<(), StoreError>;

    /// Retrieve an authorization code, consumed or not.
    async fn get_grant(&self, code: &str) -> Result<Option<AuthorizationGrant>, StoreError>;

    /// Mark an authorization code consumed.
    async fn redeem_grant(&self, code: &str) -> Result<Redemption<AuthorizationGrant>, StoreError>;

    /// Store a freshly issued refresh token.
    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    /// Retrieve a refresh token, active or not.
    async fn get_refresh_token(&self, value: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Deactivate a refresh token.
    async fn redeem_refresh_token(&self, value: &str) -> Result<Redemption<RefreshTokenRecord>, StoreError>;

    /// Drop every grant and refresh token.
    async fn clear(&self) -> Result<(), StoreError>;
}
