//! Platform identity and the adapters that carry each platform's rules.
//!
//! This module is the only place that knows which platform is which. Every
//! other component asks [`adapter`] for a [`PlatformAdapter`] and works
//! through the trait.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, Constraint, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub mod dv360;
pub mod google_ads;
pub mod linkedin;
pub mod meta;
pub mod tiktok;
pub mod trade_desk;

/// The emulated advertising networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Meta,
    GoogleAds,
    #[serde(rename = "linkedin")]
    LinkedIn,
    #[serde(rename = "tiktok")]
    TikTok,
    TradeDesk,
    Dv360,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Meta,
        Platform::GoogleAds,
        Platform::LinkedIn,
        Platform::TikTok,
        Platform::TradeDesk,
        Platform::Dv360,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::GoogleAds => "google_ads",
            Platform::LinkedIn => "linkedin",
            Platform::TikTok => "tiktok",
            Platform::TradeDesk => "trade_desk",
            Platform::Dv360 => "dv360",
        }
    }

    /// Stable position used to index per-platform tables.
    pub fn index(&self) -> usize {
        match self {
            Platform::Meta => 0,
            Platform::GoogleAds => 1,
            Platform::LinkedIn => 2,
            Platform::TikTok => 3,
            Platform::TradeDesk => 4,
            Platform::Dv360 => 5,
        }
    }

    pub fn profile(&self) -> &'static PlatformProfile {
        adapter(*self).profile()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

/// How the access token travels on protected requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `<header>: Bearer <token>`
    Bearer,
    /// `<header>: <token>`
    Raw,
}

/// Static, per-platform protocol constants.
#[derive(Debug)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// Header carrying the access token on resource requests.
    pub auth_header: &'static str,
    pub auth_scheme: AuthScheme,
    /// Query parameter accepted as an alternative to the header.
    pub query_token_param: Option<&'static str>,
    pub grant_types: &'static [GrantType],
    /// Substring the requested scope must contain at authorize time.
    pub required_scope: Option<&'static str>,
    /// Whether the token endpoint insists on `redirect_uri` for code exchange.
    pub exchange_requires_redirect: bool,
    /// Advertised `expires_in` of the static access token, in seconds.
    pub access_token_ttl: u64,
    /// Advertised lifetime of refresh tokens, if the platform publishes one.
    pub refresh_token_ttl: Option<u64>,
    pub token_type: &'static str,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub code_prefix: &'static str,
    pub refresh_prefix: &'static str,
}

impl PlatformProfile {
    pub fn supports(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }
}

/// Per-platform glue: validation rules, identifier scheme, representation and
/// error envelope.
pub trait PlatformAdapter: Send + Sync + 'static {
    fn profile(&self) -> &'static PlatformProfile;

    fn platform(&self) -> Platform {
        self.profile().platform
    }

    /// Ordered rule table for a resource type.
    fn rules(&self, resource_type: ResourceType) -> &'static [Rule];

    /// Platform vocabulary for a violated constraint.
    fn violation_code(&self, constraint: &Constraint) -> String;

    /// Formats the `seq`-th identifier allocated on this platform.
    fn format_id(&self, resource_type: ResourceType, seq: u64) -> String;

    /// Extracts the identifier from a reference value (plain id, URN or
    /// resource name). `None` means the value is not a reference at all.
    fn reference_id(&self, _target: ResourceType, raw: &Value) -> Option<String> {
        plain_id(raw)
    }

    /// Hook run on the payload after validation: defaults, stripping
    /// server-owned fields.
    fn normalize(&self, resource_type: ResourceType, _mode: Mode, fields: &mut Map<String, Value>) {
        fields.remove(resource_type.id_field());
    }

    /// Status patch applied when the platform "deletes" a resource. Resources
    /// are never removed from storage.
    fn delete_patch(&self, resource: &Resource) -> Result<Map<String, Value>, ApiError>;

    /// Native JSON representation. With a projection, only the requested
    /// keys (plus the identifier) are emitted.
    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value;

    /// Converts an internal error into the platform's envelope.
    fn error_envelope(&self, err: &ApiError) -> ErrorResponse;
}

static META: meta::MetaAdapter = meta::MetaAdapter;
static GOOGLE_ADS: google_ads::GoogleAdsAdapter = google_ads::GoogleAdsAdapter;
static LINKEDIN: linkedin::LinkedInAdapter = linkedin::LinkedInAdapter;
static TIKTOK: tiktok::TikTokAdapter = tiktok::TikTokAdapter;
static TRADE_DESK: trade_desk::TradeDeskAdapter = trade_desk::TradeDeskAdapter;
static DV360: dv360::Dv360Adapter = dv360::Dv360Adapter;

/// Looks up the adapter for a platform.
pub fn adapter(platform: Platform) -> &'static dyn PlatformAdapter {
    match platform {
        Platform::Meta => &META,
        Platform::GoogleAds => &GOOGLE_ADS,
        Platform::LinkedIn => &LINKEDIN,
        Platform::TikTok => &TIKTOK,
        Platform::TradeDesk => &TRADE_DESK,
        Platform::Dv360 => &DV360,
    }
}

/// Accepts ids sent either as JSON strings or JSON numbers.
pub(crate) fn plain_id(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `true` when `key` should be emitted under the given projection.
pub(crate) fn wanted(projection: Option<&[String]>, key: &str) -> bool {
    projection.is_none_or(|fields| fields.iter().any(|f| f == key))
}

/// Copies stored fields into `out`, honouring the projection.
pub(crate) fn copy_fields(out: &mut Map<String, Value>, resource: &Resource, projection: Option<&[String]>) {
    for (key, value) in &resource.fields {
        if wanted(projection, key) {
            out.insert(key.clone(), value.clone());
        }
    }
}

/// `google.rpc.Code` name for an HTTP status, shared by the Google APIs.
pub(crate) fn rpc_status(status: u16) -> &'static str {
    match status {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        409 => "ALREADY_EXISTS",
        412 => "FAILED_PRECONDITION",
        429 => "RESOURCE_EXHAUSTED",
        _ => "INTERNAL",
    }
}

/// Sets `field` to `value` unless the caller already supplied one.
pub(crate) fn default_field(fields: &mut Map<String, Value>, field: &str, value: &str) {
    if !fields.contains_key(field) {
        fields.insert(field.to_string(), Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_names_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
            assert_eq!(adapter(platform).platform(), platform);
        }
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn plain_references_accept_strings_and_numbers() {
        let ttd = adapter(Platform::TradeDesk);
        let target = ResourceType::TradeDeskCampaign;
        assert_eq!(ttd.reference_id(target, &serde_json::json!("abc1234")).as_deref(), Some("abc1234"));
        assert_eq!(ttd.reference_id(target, &serde_json::json!(7001)).as_deref(), Some("7001"));
        assert_eq!(ttd.reference_id(target, &serde_json::json!("")), None);
        assert_eq!(ttd.reference_id(target, &serde_json::json!({"id": 1})), None);
    }

    #[test]
    fn page_limits_are_sane() {
        for platform in Platform::ALL {
            let profile = platform.profile();
            assert!(profile.default_page_size <= profile.max_page_size, "{}", platform);
            assert!(!profile.grant_types.is_empty(), "{}", platform);
        }
    }
}
