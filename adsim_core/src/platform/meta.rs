//! Meta Marketing API: campaigns, ad sets, ads and ad creatives under
//! `act_<account>`.

use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, default_field, wanted};
use crate::error::{ApiError, AuthFailure, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::pagination::{Cursor, Page};
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub const OBJECTIVES: &[&str] = &[
    "OUTCOME_AWARENESS",
    "OUTCOME_TRAFFIC",
    "OUTCOME_ENGAGEMENT",
    "OUTCOME_LEADS",
    "OUTCOME_APP_PROMOTION",
    "OUTCOME_SALES",
];
pub const STATUSES: &[&str] = &["ACTIVE", "PAUSED", "DELETED", "ARCHIVED"];
pub const SPECIAL_AD_CATEGORIES: &[&str] = &["NONE", "EMPLOYMENT", "HOUSING", "CREDIT", "ISSUES_ELECTIONS_POLITICS"];
pub const BID_STRATEGIES: &[&str] = &["LOWEST_COST_WITHOUT_CAP", "LOWEST_COST_WITH_BID_CAP", "COST_CAP"];
pub const BILLING_EVENTS: &[&str] = &["IMPRESSIONS", "LINK_CLICKS", "THRUPLAY", "APP_INSTALLS", "PAGE_LIKES"];
pub const OPTIMIZATION_GOALS: &[&str] = &[
    "REACH",
    "IMPRESSIONS",
    "LINK_CLICKS",
    "LANDING_PAGE_VIEWS",
    "OFFSITE_CONVERSIONS",
    "LEAD_GENERATION",
    "APP_INSTALLS",
    "THRUPLAY",
    "POST_ENGAGEMENT",
];
pub const PUBLISHER_PLATFORMS: &[&str] = &["facebook", "instagram", "audience_network", "messenger"];
pub const CALL_TO_ACTIONS: &[&str] = &[
    "LEARN_MORE",
    "SHOP_NOW",
    "SIGN_UP",
    "DOWNLOAD",
    "CONTACT_US",
    "APPLY_NOW",
    "BOOK_TRAVEL",
    "NO_BUTTON",
];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("objective"),
    Rule::OneOf("objective", OBJECTIVES),
    Rule::OneOf("status", STATUSES),
    Rule::Elements("special_ad_categories", SPECIAL_AD_CATEGORIES),
    Rule::OneOf("bid_strategy", BID_STRATEGIES),
    Rule::Positive("daily_budget"),
    Rule::Positive("lifetime_budget"),
    Rule::Positive("spend_cap"),
    Rule::Immutable("objective"),
];

const AD_SET_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("campaign_id"),
    Rule::Required("billing_event"),
    Rule::OneOf("billing_event", BILLING_EVENTS),
    Rule::Required("optimization_goal"),
    Rule::OneOf("optimization_goal", OPTIMIZATION_GOALS),
    Rule::OneOf("status", STATUSES),
    Rule::OneOf("bid_strategy", BID_STRATEGIES),
    Rule::Positive("daily_budget"),
    Rule::Positive("lifetime_budget"),
    Rule::Positive("bid_amount"),
    Rule::Required("targeting"),
    Rule::NonEmpty("targeting"),
    Rule::Elements("targeting.publisher_platforms", PUBLISHER_PLATFORMS),
    Rule::Immutable("campaign_id"),
    Rule::Reference("campaign_id", ResourceType::MetaCampaign),
];

const AD_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("adset_id"),
    Rule::Required("creative"),
    Rule::Required("creative.creative_id"),
    Rule::OneOf("status", STATUSES),
    Rule::Immutable("adset_id"),
    Rule::Reference("adset_id", ResourceType::MetaAdSet),
    Rule::Reference("creative.creative_id", ResourceType::MetaAdCreative),
];

const CREATIVE_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("object_story_spec"),
    Rule::NonEmpty("object_story_spec"),
    Rule::OneOf("call_to_action_type", CALL_TO_ACTIONS),
];

/// Order in which the generic `/{id}` route tries the typed collections.
pub const LOOKUP_ORDER: &[ResourceType] = &[
    ResourceType::MetaCampaign,
    ResourceType::MetaAdSet,
    ResourceType::MetaAd,
    ResourceType::MetaAdCreative,
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::Meta,
    auth_header: "authorization",
    auth_scheme: AuthScheme::Bearer,
    query_token_param: Some("access_token"),
    grant_types: &[GrantType::AuthorizationCode, GrantType::RefreshToken, GrantType::ClientCredentials],
    required_scope: Some("ads_"),
    exchange_requires_redirect: true,
    access_token_ttl: 5_183_944,
    refresh_token_ttl: None,
    token_type: "bearer",
    default_page_size: 25,
    max_page_size: 100,
    code_prefix: "AQ",
    refresh_prefix: "EAAR",
};

pub struct MetaAdapter;

impl MetaAdapter {
    fn id_prefix(resource_type: ResourceType) -> u64 {
        match resource_type {
            ResourceType::MetaCampaign => 1202,
            ResourceType::MetaAdSet => 1203,
            ResourceType::MetaAd => 1204,
            _ => 1205,
        }
    }
}

impl PlatformAdapter for MetaAdapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::MetaCampaign => CAMPAIGN_RULES,
            ResourceType::MetaAdSet => AD_SET_RULES,
            ResourceType::MetaAd => AD_RULES,
            ResourceType::MetaAdCreative => CREATIVE_RULES,
            _ => &[],
        }
    }

    /// Graph API reports every parameter problem as code 100.
    fn violation_code(&self, _constraint: &Constraint) -> String {
        "100".to_string()
    }

    /// 18 digits: a per-type prefix followed by the sequence.
    fn format_id(&self, resource_type: ResourceType, seq: u64) -> String {
        format!("{}{:014}", Self::id_prefix(resource_type), seq)
    }

    fn normalize(&self, resource_type: ResourceType, mode: Mode, fields: &mut Map<String, Value>) {
        for owned in ["id", "account_id", "created_time", "updated_time"] {
            fields.remove(owned);
        }
        if mode == Mode::Create {
            default_field(fields, "status", "ACTIVE");
            if resource_type == ResourceType::MetaCampaign && !fields.contains_key("special_ad_categories") {
                fields.insert("special_ad_categories".to_string(), json!([]));
            }
        }
    }

    fn delete_patch(&self, _resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!("DELETED"));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        out.insert("id".to_string(), json!(resource.id));
        if wanted(projection, "account_id") {
            out.insert("account_id".to_string(), json!(resource.scope));
        }
        copy_fields(&mut out, resource, projection);
        if wanted(projection, "created_time") {
            out.insert("created_time".to_string(), json!(graph_time(resource.created_at)));
        }
        if wanted(projection, "updated_time") {
            out.insert("updated_time".to_string(), json!(graph_time(resource.updated_at)));
        }
        Value::Object(out)
    }

    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let (status, code, subcode, kind, message) = match err {
            ApiError::Validation(violation) => (
                400,
                100,
                None,
                "OAuthException",
                format!("(#100) {}", violation.message()),
            ),
            ApiError::NotFound { id, .. } => (
                404,
                100,
                Some(33),
                "GraphMethodException",
                format!(
                    "Unsupported get request. Object with ID '{}' does not exist, cannot be loaded due to missing permissions, or does not support this operation.",
                    id
                ),
            ),
            ApiError::Unauthenticated { reason } => (401, 190, None, "OAuthException", auth_message(*reason)),
            ApiError::InvalidClient => (
                401,
                101,
                None,
                "OAuthException",
                "Error validating client secret.".to_string(),
            ),
            _ => match err.kind() {
                ErrorKind::Validation => (400, 100, None, "OAuthException", format!("(#100) {}", err.public_message())),
                ErrorKind::Unauthorized => (403, 200, None, "OAuthException", "(#200) Permissions error".to_string()),
                ErrorKind::RateLimited => (429, 17, None, "OAuthException", "(#17) User request limit reached".to_string()),
                _ => (500, 2, None, "OAuthException", err.public_message()),
            },
        };
        let mut error = Map::new();
        error.insert("message".to_string(), json!(message));
        error.insert("type".to_string(), json!(kind));
        error.insert("code".to_string(), json!(code));
        if let Some(subcode) = subcode {
            error.insert("error_subcode".to_string(), json!(subcode));
        }
        error.insert("fbtrace_id".to_string(), json!(trace_id()));
        ErrorResponse::new(status, json!({ "error": error }))
    }
}

fn auth_message(reason: AuthFailure) -> String {
    match reason {
        AuthFailure::Missing => "An active access token must be used to query information about the current user.".to_string(),
        AuthFailure::MalformedScheme | AuthFailure::Empty => "Invalid OAuth access token - Cannot parse access token".to_string(),
        AuthFailure::Invalid => "Error validating access token: The session is invalid.".to_string(),
        AuthFailure::MissingHeader(name) => format!("Missing required header {}", name),
    }
}

/// Graph API timestamps: `2024-01-31T12:00:00+0000`.
fn graph_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

fn trace_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(11);
    id
}

/// `act_123` or `123` both name account `123`.
pub fn account_scope(raw: &str) -> &str {
    raw.strip_prefix("act_").unwrap_or(raw)
}

/// `{data, paging}` list body. `next_link` builds the URL for the next
/// page from its `after` cursor.
pub fn list_envelope(data: Vec<Value>, page: &Page<Resource>, next_link: impl Fn(&str) -> String) -> Value {
    if data.is_empty() {
        return json!({ "data": data });
    }
    let before = Cursor::new(page.offset, page.page_size).encode();
    let mut paging = Map::new();
    let mut cursors = Map::new();
    cursors.insert("before".to_string(), json!(before));
    cursors.insert(
        "after".to_string(),
        json!(page.next_cursor.clone().unwrap_or_else(|| before.clone())),
    );
    paging.insert("cursors".to_string(), Value::Object(cursors));
    if let Some(after) = &page.next_cursor {
        paging.insert("next".to_string(), json!(next_link(after)));
    }
    json!({ "data": data, "paging": paging })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn ids_are_eighteen_digits() {
        let id = MetaAdapter.format_id(ResourceType::MetaAdSet, 7);
        assert_eq!(id.len(), 18);
        assert!(id.starts_with("1203"));
        assert!(id.ends_with("7"));
    }

    #[test]
    fn campaign_needs_a_known_objective() {
        let err = check(
            &MetaAdapter,
            ResourceType::MetaCampaign,
            Mode::Create,
            &fields(json!({"name": "A", "objective": "CONVERSIONS"})),
            None,
        )
        .unwrap_err();
        assert_eq!(err.field, "objective");
        assert_eq!(err.code, "100");
    }

    #[test]
    fn not_found_uses_graph_subcode() {
        let resp = MetaAdapter.error_envelope(&ApiError::not_found(ResourceType::MetaCampaign, "1"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body["error"]["code"], 100);
        assert_eq!(resp.body["error"]["error_subcode"], 33);
        assert_eq!(resp.body["error"]["fbtrace_id"].as_str().unwrap().len(), 11);
    }

    #[test]
    fn bad_token_is_oauth_exception_190() {
        let resp = MetaAdapter.error_envelope(&ApiError::unauthenticated(AuthFailure::Invalid));
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body["error"]["type"], "OAuthException");
        assert_eq!(resp.body["error"]["code"], 190);
    }

    #[test]
    fn account_prefix_is_optional() {
        assert_eq!(account_scope("act_42"), "42");
        assert_eq!(account_scope("42"), "42");
    }
}
