//! OAuth2 primitives: grant types, requests, issued tokens and stored grants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::platform::Platform;

/// Grant types understood by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            other => Err(ApiError::UnsupportedGrantType { grant_type: other.to_string() }),
        }
    }
}

/// Parameters of the authorization endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub response_type: String,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Successful authorization: the code to redeem plus the echoed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Parameters of the token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

/// Token endpoint result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A code handed out by the authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    pub code: String,
    pub platform: Platform,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Set exactly once, by the first successful exchange.
    pub consumed: bool,
}

/// A refresh token that can be rotated once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub value: String,
    pub platform: Platform,
    pub client_id: String,
    pub scope: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Cleared when the token is rotated out or revoked.
    pub active: bool,
}

/// Outcome of an atomic single-use redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption<T> {
    /// This call flipped the record; the caller owns the redemption.
    Redeemed(T),
    /// Somebody already redeemed it.
    AlreadyUsed(T),
    Unknown,
}

/// Credential as it arrived on a protected request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentedCredential<'a> {
    /// Raw value of the platform's auth header.
    pub header: Option<&'a str>,
    /// Raw value of the platform's token query parameter, if it has one.
    pub query: Option<&'a str>,
}

/// The authenticated caller of a resource request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientContext {
    pub platform: Platform,
    pub client_id: String,
    pub access_token: String,
}
