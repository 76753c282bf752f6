//! TikTok Business API v1.3: campaigns, ad groups and ads under an
//! advertiser. Every response, successful or not, travels in the
//! `{code, message, request_id, data}` envelope.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, default_field, wanted};
use crate::error::{ApiError, AuthFailure, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::pagination::Page;
use crate::resource::repository::FieldFilter;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub const OK: i64 = 0;
pub const INVALID_PARAMS: i64 = 40002;
pub const NO_PERMISSION: i64 = 40001;
pub const RATE_LIMITED: i64 = 40100;
pub const INVALID_CLIENT: i64 = 40101;
pub const INVALID_GRANT: i64 = 40102;
pub const MISSING_TOKEN: i64 = 40104;
pub const INVALID_TOKEN: i64 = 40105;
pub const INTERNAL: i64 = 50000;

pub const OBJECTIVES: &[&str] = &[
    "REACH",
    "TRAFFIC",
    "VIDEO_VIEWS",
    "ENGAGEMENT",
    "APP_PROMOTION",
    "LEAD_GENERATION",
    "WEB_CONVERSIONS",
    "PRODUCT_SALES",
];
pub const BUDGET_MODES: &[&str] = &["BUDGET_MODE_INFINITE", "BUDGET_MODE_DAY", "BUDGET_MODE_TOTAL"];
pub const OPERATION_STATUSES: &[&str] = &["ENABLE", "DISABLE", "DELETE"];
pub const PLACEMENT_TYPES: &[&str] = &["PLACEMENT_TYPE_AUTOMATIC", "PLACEMENT_TYPE_NORMAL"];
pub const PLACEMENTS: &[&str] = &["PLACEMENT_TIKTOK", "PLACEMENT_PANGLE", "PLACEMENT_GLOBAL_APP_BUNDLE"];
pub const BILLING_EVENTS: &[&str] = &["CPC", "CPM", "OCPM", "CPV"];
pub const OPTIMIZATION_GOALS: &[&str] = &["CLICK", "CONVERT", "SHOW", "REACH", "VIDEO_VIEW", "LEAD_GENERATION"];
pub const AD_FORMATS: &[&str] = &["SINGLE_IMAGE", "SINGLE_VIDEO", "CAROUSEL"];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("campaign_name"),
    Rule::NonEmpty("campaign_name"),
    Rule::Required("objective_type"),
    Rule::OneOf("objective_type", OBJECTIVES),
    Rule::Required("budget_mode"),
    Rule::OneOf("budget_mode", BUDGET_MODES),
    Rule::RequiredWhen { field: "budget", when: "budget_mode", equals: "BUDGET_MODE_DAY" },
    Rule::RequiredWhen { field: "budget", when: "budget_mode", equals: "BUDGET_MODE_TOTAL" },
    Rule::Positive("budget"),
    Rule::OneOf("operation_status", OPERATION_STATUSES),
    Rule::Immutable("objective_type"),
];

const AD_GROUP_RULES: &[Rule] = &[
    Rule::Required("campaign_id"),
    Rule::Required("adgroup_name"),
    Rule::NonEmpty("adgroup_name"),
    Rule::Required("placement_type"),
    Rule::OneOf("placement_type", PLACEMENT_TYPES),
    Rule::RequiredWhen { field: "placements", when: "placement_type", equals: "PLACEMENT_TYPE_NORMAL" },
    Rule::Elements("placements", PLACEMENTS),
    Rule::Required("budget_mode"),
    Rule::OneOf("budget_mode", BUDGET_MODES),
    Rule::Positive("budget"),
    Rule::Required("billing_event"),
    Rule::OneOf("billing_event", BILLING_EVENTS),
    Rule::Positive("bid_price"),
    Rule::Required("optimization_goal"),
    Rule::OneOf("optimization_goal", OPTIMIZATION_GOALS),
    Rule::OneOf("operation_status", OPERATION_STATUSES),
    Rule::Immutable("campaign_id"),
    Rule::Reference("campaign_id", ResourceType::TikTokCampaign),
];

const AD_RULES: &[Rule] = &[
    Rule::Required("adgroup_id"),
    Rule::Required("ad_name"),
    Rule::NonEmpty("ad_name"),
    Rule::Required("ad_format"),
    Rule::OneOf("ad_format", AD_FORMATS),
    Rule::Required("ad_text"),
    Rule::OneOf("operation_status", OPERATION_STATUSES),
    Rule::Immutable("adgroup_id"),
    Rule::Reference("adgroup_id", ResourceType::TikTokAdGroup),
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::TikTok,
    auth_header: "access-token",
    auth_scheme: AuthScheme::Raw,
    query_token_param: None,
    grant_types: &[GrantType::AuthorizationCode, GrantType::RefreshToken],
    required_scope: None,
    exchange_requires_redirect: false,
    access_token_ttl: 86_400,
    refresh_token_ttl: Some(31_536_000),
    token_type: "Bearer",
    default_page_size: 10,
    max_page_size: 1000,
    code_prefix: "",
    refresh_prefix: "",
};

/// Path segment (`campaign`, `adgroup`, `ad`) to resource type.
pub fn from_segment(segment: &str) -> Option<ResourceType> {
    match segment {
        "campaign" => Some(ResourceType::TikTokCampaign),
        "adgroup" => Some(ResourceType::TikTokAdGroup),
        "ad" => Some(ResourceType::TikTokAd),
        _ => None,
    }
}

/// Key of the id list accepted by the batch endpoints (`campaign_ids`).
pub fn ids_field(resource_type: ResourceType) -> String {
    format!("{}s", resource_type.id_field())
}

pub struct TikTokAdapter;

impl PlatformAdapter for TikTokAdapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::TikTokCampaign => CAMPAIGN_RULES,
            ResourceType::TikTokAdGroup => AD_GROUP_RULES,
            ResourceType::TikTokAd => AD_RULES,
            _ => &[],
        }
    }

    fn violation_code(&self, _constraint: &Constraint) -> String {
        INVALID_PARAMS.to_string()
    }

    /// 19 digits starting with `17`.
    fn format_id(&self, _resource_type: ResourceType, seq: u64) -> String {
        format!("17{:017}", seq)
    }

    fn normalize(&self, resource_type: ResourceType, mode: Mode, fields: &mut Map<String, Value>) {
        fields.remove(resource_type.id_field());
        for owned in ["advertiser_id", "create_time", "modify_time"] {
            fields.remove(owned);
        }
        if mode == Mode::Create {
            default_field(fields, "operation_status", "ENABLE");
        }
    }

    fn delete_patch(&self, _resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        let mut patch = Map::new();
        patch.insert("operation_status".to_string(), json!("DELETE"));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        let id_field = resource.resource_type.id_field();
        out.insert(id_field.to_string(), json!(resource.id));
        if wanted(projection, "advertiser_id") {
            out.insert("advertiser_id".to_string(), json!(resource.scope));
        }
        copy_fields(&mut out, resource, projection);
        if wanted(projection, "create_time") {
            out.insert("create_time".to_string(), json!(timestamp(resource.created_at)));
        }
        if wanted(projection, "modify_time") {
            out.insert("modify_time".to_string(), json!(timestamp(resource.updated_at)));
        }
        Value::Object(out)
    }

    /// HTTP 200 for everything the API reports through `code`; only
    /// internal failures surface as a 500.
    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let code = error_code(err);
        let status = if code == INTERNAL { 500 } else { 200 };
        let message = match err {
            ApiError::Unauthenticated { reason: AuthFailure::Missing } => "Access token is null, or expired.".to_string(),
            ApiError::Unauthenticated { .. } => "Access token is incorrect or has been revoked.".to_string(),
            _ => err.public_message(),
        };
        ErrorResponse::new(status, envelope(code, &message, json!({})))
    }
}

fn error_code(err: &ApiError) -> i64 {
    match err {
        ApiError::Unauthenticated { reason: AuthFailure::Missing } => MISSING_TOKEN,
        ApiError::Unauthenticated { .. } => INVALID_TOKEN,
        ApiError::InvalidClient => INVALID_CLIENT,
        ApiError::InvalidGrant { .. } => INVALID_GRANT,
        _ => match err.kind() {
            ErrorKind::Validation => INVALID_PARAMS,
            ErrorKind::NotFound | ErrorKind::Unauthorized => NO_PERMISSION,
            ErrorKind::Unauthenticated => INVALID_TOKEN,
            ErrorKind::RateLimited => RATE_LIMITED,
            ErrorKind::Internal => INTERNAL,
        },
    }
}

/// `2024-01-31 12:00:00`, as the API renders times.
fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn request_id() -> String {
    format!("{}{}", Utc::now().format("%Y%m%d%H%M%S"), Uuid::new_v4().simple())
}

/// The envelope every response shares.
pub fn envelope(code: i64, message: &str, data: Value) -> Value {
    json!({ "code": code, "message": message, "request_id": request_id(), "data": data })
}

/// Successful response.
pub fn ok(data: Value) -> Value {
    envelope(OK, "OK", data)
}

/// `{list, page_info}` payload of the `get` endpoints.
pub fn list_data(list: Vec<Value>, page: &Page<Resource>) -> Value {
    json!({
        "list": list,
        "page_info": {
            "page": page.page_number(),
            "page_size": page.page_size,
            "total_number": page.total,
            "total_page": page.total_pages(),
        },
    })
}

/// Translates the `filtering` object of a `get` call. Id lists such as
/// `campaign_ids` match the singular id field; other keys match verbatim.
pub fn parse_filtering(filtering: &Value) -> Result<Vec<FieldFilter>, ApiError> {
    let object = match filtering {
        Value::Null => return Ok(Vec::new()),
        Value::Object(object) => object,
        _ => return Err(ApiError::validation("filtering", Constraint::Format("JSON object"), INVALID_PARAMS.to_string())),
    };
    Ok(object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let path = match key.strip_suffix("_ids") {
                Some(stem) => format!("{}_id", stem),
                None => key.clone(),
            };
            let values = match value {
                Value::Array(items) => items.clone(),
                single => vec![single.clone()],
            };
            FieldFilter::any_of(path, values)
        })
        .collect())
}
