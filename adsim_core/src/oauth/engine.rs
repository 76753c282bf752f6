//! The grant state machine: authorize, exchange, authenticate.
//!
//! Access tokens are never minted: every successful exchange hands out the
//! platform's configured static token. What the engine does track is the
//! single-use life of authorization codes and refresh tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::provider::GrantStore;
use super::types::{
    AuthorizationGrant, AuthorizeRequest, AuthorizeResponse, ClientContext, GrantType, IssuedToken,
    PresentedCredential, Redemption, RefreshTokenRecord, TokenRequest,
};
use crate::credentials::{ClientCredential, CredentialStore};
use crate::error::{ApiError, AuthFailure};
use crate::platform::{AuthScheme, Platform, PlatformProfile};

/// Optional wall-clock limits. Unset fields mean codes and refresh tokens
/// stay valid until used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub code_ttl: Option<Duration>,
    pub refresh_ttl: Option<Duration>,
}

/// Issues and redeems grants for all platforms.
#[derive(Clone)]
pub struct GrantEngine {
    credentials: Arc<dyn CredentialStore>,
    grants: Arc<dyn GrantStore>,
    policy: ExpiryPolicy,
}

impl GrantEngine {
    /// Creates an engine with the permissive expiry policy.
    pub fn new(credentials: Arc<dyn CredentialStore>, grants: Arc<dyn GrantStore>) -> Self {
        Self::with_policy(credentials, grants, ExpiryPolicy::default())
    }

    pub fn with_policy(
        credentials: Arc<dyn CredentialStore>,
        grants: Arc<dyn GrantStore>,
        policy: ExpiryPolicy,
    ) -> Self {
        GrantEngine { credentials, grants, policy }
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Handles the authorization endpoint and returns a fresh code.
    #[instrument(skip(self, request), fields(client_id = %request.client_id), level = "debug")]
    pub async fn authorize(
        &self,
        platform: Platform,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizeResponse, ApiError> {
        let profile = platform.profile();
        if request.response_type != "code" {
            return Err(ApiError::UnsupportedResponseType {
                response_type: request.response_type.clone(),
            });
        }
        let credential = self.credentials.credential(platform).await?;
        if !credential.matches_client(&request.client_id) {
            return Err(ApiError::InvalidClient);
        }
        if request.redirect_uri.trim().is_empty() {
            return Err(ApiError::invalid_request("redirect_uri is required"));
        }
        if let Some(required) = profile.required_scope {
            let granted = request.scope.as_deref().unwrap_or_default();
            if !granted.contains(required) {
                return Err(ApiError::InvalidScope { required: required.to_string() });
            }
        }

        let code = format!("{}{}", profile.code_prefix, Uuid::new_v4().simple());
        self.grants
            .store_grant(AuthorizationGrant {
                code: code.clone(),
                platform,
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                scope: request.scope.clone(),
                state: request.state.clone(),
                issued_at: Utc::now(),
                consumed: false,
            })
            .await?;
        info!(platform = %platform, "authorization code issued");
        Ok(AuthorizeResponse { code, state: request.state.clone() })
    }

    /// Handles the token endpoint for every supported grant type.
    #[instrument(skip(self, request), fields(grant_type = %request.grant_type), level = "debug")]
    pub async fn exchange(&self, platform: Platform, request: &TokenRequest) -> Result<IssuedToken, ApiError> {
        let profile = platform.profile();
        let grant_type: GrantType = request.grant_type.parse()?;
        if !profile.supports(grant_type) {
            return Err(ApiError::UnsupportedGrantType {
                grant_type: request.grant_type.clone(),
            });
        }
        let credential = self.credentials.credential(platform).await?;
        if !credential.matches_client(&request.client_id)
            || !credential.matches_secret(request.client_secret.as_deref())
        {
            return Err(ApiError::InvalidClient);
        }

        match grant_type {
            GrantType::AuthorizationCode => self.redeem_code(profile, &credential, request).await,
            GrantType::RefreshToken => self.rotate_refresh_token(profile, &credential, request).await,
            GrantType::ClientCredentials => Ok(IssuedToken {
                access_token: credential.static_access_token.clone(),
                token_type: profile.token_type.to_string(),
                expires_in: profile.access_token_ttl,
                refresh_token: None,
                refresh_token_expires_in: None,
                scope: request.scope.clone(),
            }),
        }
    }

    async fn redeem_code(
        &self,
        profile: &'static PlatformProfile,
        credential: &ClientCredential,
        request: &TokenRequest,
    ) -> Result<IssuedToken, ApiError> {
        let code = non_empty(request.code.as_deref()).ok_or_else(|| ApiError::invalid_request("code is required"))?;
        let grant = self
            .grants
            .get_grant(code)
            .await?
            .ok_or_else(|| ApiError::invalid_grant("authorization code is invalid"))?;
        if grant.platform != profile.platform || grant.client_id != credential.client_id {
            return Err(ApiError::invalid_grant("authorization code was issued to another client"));
        }
        if grant.consumed {
            return Err(ApiError::invalid_grant("authorization code has already been used"));
        }
        if let Some(ttl) = self.policy.code_ttl {
            // past the end of the calendar means it never expires
            if grant.issued_at.checked_add_signed(ttl).is_some_and(|deadline| deadline < Utc::now()) {
                return Err(ApiError::invalid_grant("authorization code has expired"));
            }
        }
        match non_empty(request.redirect_uri.as_deref()) {
            Some(uri) if uri != grant.redirect_uri => {
                return Err(ApiError::invalid_grant("redirect_uri does not match the authorization request"));
            }
            None if profile.exchange_requires_redirect => {
                return Err(ApiError::invalid_request("redirect_uri is required"));
            }
            _ => {}
        }

        let grant = match self.grants.redeem_grant(code).await? {
            Redemption::Redeemed(grant) => grant,
            Redemption::AlreadyUsed(_) => {
                return Err(ApiError::invalid_grant("authorization code has already been used"));
            }
            Redemption::Unknown => return Err(ApiError::invalid_grant("authorization code is invalid")),
        };
        debug!(platform = %profile.platform, "authorization code consumed");
        self.issue_with_refresh(profile, credential, grant.scope).await
    }

    async fn rotate_refresh_token(
        &self,
        profile: &'static PlatformProfile,
        credential: &ClientCredential,
        request: &TokenRequest,
    ) -> Result<IssuedToken, ApiError> {
        let value = non_empty(request.refresh_token.as_deref())
            .ok_or_else(|| ApiError::invalid_request("refresh_token is required"))?;
        let record = self
            .grants
            .get_refresh_token(value)
            .await?
            .ok_or_else(|| ApiError::invalid_grant("refresh token is invalid"))?;
        if record.platform != profile.platform || record.client_id != credential.client_id {
            return Err(ApiError::invalid_grant("refresh token was issued to another client"));
        }
        if !record.active {
            return Err(ApiError::invalid_grant("refresh token has been rotated or revoked"));
        }
        if record.expires_at.is_some_and(|at| at < Utc::now()) {
            return Err(ApiError::invalid_grant("refresh token has expired"));
        }

        let record = match self.grants.redeem_refresh_token(value).await? {
            Redemption::Redeemed(record) => record,
            Redemption::AlreadyUsed(_) => {
                return Err(ApiError::invalid_grant("refresh token has been rotated or revoked"));
            }
            Redemption::Unknown => return Err(ApiError::invalid_grant("refresh token is invalid")),
        };
        debug!(platform = %profile.platform, "refresh token rotated");
        self.issue_with_refresh(profile, credential, record.scope).await
    }

    async fn issue_with_refresh(
        &self,
        profile: &'static PlatformProfile,
        credential: &ClientCredential,
        scope: Option<String>,
    ) -> Result<IssuedToken, ApiError> {
        let now = Utc::now();
        let value = format!("{}{}", profile.refresh_prefix, Uuid::new_v4().simple());
        self.grants
            .store_refresh_token(RefreshTokenRecord {
                value: value.clone(),
                platform: profile.platform,
                client_id: credential.client_id.clone(),
                scope: scope.clone(),
                issued_at: now,
                expires_at: self.policy.refresh_ttl.and_then(|ttl| now.checked_add_signed(ttl)),
                active: true,
            })
            .await?;
        let refresh_token_expires_in = match self.policy.refresh_ttl {
            Some(ttl) => Some(ttl.num_seconds().max(0) as u64),
            None => profile.refresh_token_ttl,
        };
        Ok(IssuedToken {
            access_token: credential.static_access_token.clone(),
            token_type: profile.token_type.to_string(),
            expires_in: profile.access_token_ttl,
            refresh_token: Some(value),
            refresh_token_expires_in,
            scope,
        })
    }

    /// Checks the credential presented on a resource request.
    #[instrument(skip(self, presented), level = "debug")]
    pub async fn authenticate(
        &self,
        platform: Platform,
        presented: PresentedCredential<'_>,
    ) -> Result<ClientContext, ApiError> {
        let token = extract_token(platform.profile(), presented).map_err(ApiError::unauthenticated)?;
        let credential = self.credentials.credential(platform).await?;
        if token != credential.static_access_token {
            return Err(ApiError::unauthenticated(AuthFailure::Invalid));
        }
        Ok(ClientContext {
            platform,
            client_id: credential.client_id,
            access_token: token.to_string(),
        })
    }

    /// Deactivates a refresh token. Unknown tokens are ignored.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn revoke(&self, platform: Platform, token: &str) -> Result<(), ApiError> {
        match self.grants.get_refresh_token(token).await? {
            Some(record) if record.platform == platform => {
                self.grants.redeem_refresh_token(token).await?;
                info!(platform = %platform, "refresh token revoked");
            }
            _ => debug!(platform = %platform, "revocation of unknown token ignored"),
        }
        Ok(())
    }

    /// Drops every outstanding code and refresh token.
    pub async fn reset(&self) -> Result<(), ApiError> {
        self.grants.clear().await?;
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Pulls the raw token out of the header or query parameter according to
/// the platform's scheme.
pub fn extract_token<'a>(
    profile: &PlatformProfile,
    presented: PresentedCredential<'a>,
) -> Result<&'a str, AuthFailure> {
    if let Some(header) = presented.header {
        let header = header.trim();
        return match profile.auth_scheme {
            AuthScheme::Bearer => match header.split_once(' ') {
                Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
                    let token = token.trim();
                    if token.is_empty() { Err(AuthFailure::Empty) } else { Ok(token) }
                }
                None if header.eq_ignore_ascii_case("bearer") => Err(AuthFailure::Empty),
                None if header.is_empty() => Err(AuthFailure::Empty),
                _ => Err(AuthFailure::MalformedScheme),
            },
            AuthScheme::Raw => {
                if header.is_empty() { Err(AuthFailure::Empty) } else { Ok(header) }
            }
        };
    }
    match (profile.query_token_param, presented.query) {
        (Some(_), Some(token)) => {
            let token = token.trim();
            if token.is_empty() { Err(AuthFailure::Empty) } else { Ok(token) }
        }
        _ => Err(AuthFailure::Missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InMemoryCredentialStore;
    use crate::oauth::memory::InMemoryGrantStore;

    fn engine() -> GrantEngine {
        GrantEngine::new(
            Arc::new(InMemoryCredentialStore::with_defaults()),
            Arc::new(InMemoryGrantStore::new()),
        )
    }

    #[test]
    fn bearer_header_parsing() {
        let profile = Platform::GoogleAds.profile();
        let header = |h| PresentedCredential { header: Some(h), query: None };
        assert_eq!(extract_token(profile, header("Bearer abc")), Ok("abc"));
        assert_eq!(extract_token(profile, header("bearer abc")), Ok("abc"));
        assert_eq!(extract_token(profile, header("Bearer ")), Err(AuthFailure::Empty));
        assert_eq!(extract_token(profile, header("Bearer")), Err(AuthFailure::Empty));
        assert_eq!(extract_token(profile, header("Basic abc")), Err(AuthFailure::MalformedScheme));
        assert_eq!(extract_token(profile, header("abc")), Err(AuthFailure::MalformedScheme));
        assert_eq!(
            extract_token(profile, PresentedCredential::default()),
            Err(AuthFailure::Missing)
        );
    }

    #[test]
    fn query_token_only_where_allowed() {
        let query = PresentedCredential { header: None, query: Some("tok") };
        assert_eq!(extract_token(Platform::Meta.profile(), query), Ok("tok"));
        assert_eq!(extract_token(Platform::LinkedIn.profile(), query), Err(AuthFailure::Missing));
    }

    #[test]
    fn raw_header_platforms_take_the_value_verbatim() {
        let header = PresentedCredential { header: Some("tok"), query: None };
        assert_eq!(extract_token(Platform::TikTok.profile(), header), Ok("tok"));
        assert_eq!(extract_token(Platform::TradeDesk.profile(), header), Ok("tok"));
    }

    #[tokio::test]
    async fn authorize_checks_in_order() {
        let engine = engine();
        let client = ClientCredential::default_for(Platform::GoogleAds).client_id;
        let mut request = AuthorizeRequest {
            client_id: client,
            redirect_uri: "https://cb".into(),
            response_type: "token".into(),
            scope: Some("https://www.googleapis.com/auth/adwords".into()),
            state: Some("xyz".into()),
        };
        assert!(matches!(
            engine.authorize(Platform::GoogleAds, &request).await,
            Err(ApiError::UnsupportedResponseType { .. })
        ));
        request.response_type = "code".into();
        request.scope = Some("email".into());
        assert!(matches!(
            engine.authorize(Platform::GoogleAds, &request).await,
            Err(ApiError::InvalidScope { .. })
        ));
        request.scope = Some("https://www.googleapis.com/auth/adwords".into());
        let response = engine.authorize(Platform::GoogleAds, &request).await.unwrap();
        assert!(response.code.starts_with(Platform::GoogleAds.profile().code_prefix));
        assert_eq!(response.state.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn unsupported_grant_is_rejected_before_client_check() {
        let engine = engine();
        let request = TokenRequest {
            grant_type: "client_credentials".into(),
            client_id: "whoever".into(),
            ..Default::default()
        };
        assert!(matches!(
            engine.exchange(Platform::TikTok, &request).await,
            Err(ApiError::UnsupportedGrantType { .. })
        ));
    }

    #[tokio::test]
    async fn expired_codes_are_invalid_grants() {
        let engine = GrantEngine::with_policy(
            Arc::new(InMemoryCredentialStore::with_defaults()),
            Arc::new(InMemoryGrantStore::new()),
            ExpiryPolicy { code_ttl: Some(Duration::seconds(-1)), refresh_ttl: None },
        );
        let credential = ClientCredential::default_for(Platform::Meta);
        let code = engine
            .authorize(
                Platform::Meta,
                &AuthorizeRequest {
                    client_id: credential.client_id.clone(),
                    redirect_uri: "https://cb".into(),
                    response_type: "code".into(),
                    scope: Some("ads_management".into()),
                    state: None,
                },
            )
            .await
            .unwrap()
            .code;
        let err = engine
            .exchange(
                Platform::Meta,
                &TokenRequest {
                    grant_type: "authorization_code".into(),
                    code: Some(code),
                    client_id: credential.client_id,
                    client_secret: credential.client_secret,
                    redirect_uri: Some("https://cb".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidGrant { .. }));
    }
}
