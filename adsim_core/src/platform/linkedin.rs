//! LinkedIn Marketing API (rest.li): campaign groups, campaigns and
//! creatives under an ad account, referenced by URN.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, default_field, wanted};
use crate::error::{ApiError, AuthFailure, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::pagination::Page;
use crate::resource::repository::FieldFilter;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

/// Version served when the configuration does not name one.
pub const DEFAULT_VERSION: &str = "202401";

pub const GROUP_STATUSES: &[&str] = &["ACTIVE", "ARCHIVED", "CANCELED", "DRAFT", "PAUSED", "PENDING_DELETION", "REMOVED"];
pub const CAMPAIGN_STATUSES: &[&str] = &["ACTIVE", "PAUSED", "ARCHIVED", "COMPLETED", "CANCELED", "DRAFT", "PENDING_DELETION", "REMOVED"];
pub const CREATIVE_STATUSES: &[&str] = &["ACTIVE", "PAUSED", "DRAFT", "ARCHIVED", "CANCELED", "PENDING_DELETION"];
pub const CAMPAIGN_TYPES: &[&str] = &["TEXT_AD", "SPONSORED_UPDATES", "SPONSORED_INMAILS", "DYNAMIC"];
pub const COST_TYPES: &[&str] = &["CPM", "CPC", "CPV"];
pub const OBJECTIVES: &[&str] = &[
    "BRAND_AWARENESS",
    "ENGAGEMENT",
    "JOB_APPLICANTS",
    "LEAD_GENERATION",
    "WEBSITE_CONVERSIONS",
    "WEBSITE_VISITS",
    "VIDEO_VIEWS",
];

const GROUP_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::OneOf("status", GROUP_STATUSES),
    Rule::Positive("totalBudget.amount"),
];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("campaignGroup"),
    Rule::Required("type"),
    Rule::OneOf("type", CAMPAIGN_TYPES),
    Rule::Required("costType"),
    Rule::OneOf("costType", COST_TYPES),
    Rule::OneOf("objectiveType", OBJECTIVES),
    Rule::OneOf("status", CAMPAIGN_STATUSES),
    Rule::Positive("dailyBudget.amount"),
    Rule::Positive("unitCost.amount"),
    Rule::Immutable("campaignGroup"),
    Rule::Reference("campaignGroup", ResourceType::LinkedInCampaignGroup),
];

const CREATIVE_RULES: &[Rule] = &[
    Rule::Required("campaign"),
    Rule::Required("content"),
    Rule::NonEmpty("content"),
    Rule::OneOf("intendedStatus", CREATIVE_STATUSES),
    Rule::Immutable("campaign"),
    Rule::Reference("campaign", ResourceType::LinkedInCampaign),
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::LinkedIn,
    auth_header: "authorization",
    auth_scheme: AuthScheme::Bearer,
    query_token_param: None,
    grant_types: &[GrantType::AuthorizationCode, GrantType::RefreshToken, GrantType::ClientCredentials],
    required_scope: Some("ads"),
    exchange_requires_redirect: true,
    access_token_ttl: 5_184_000,
    refresh_token_ttl: Some(31_536_000),
    token_type: "Bearer",
    default_page_size: 10,
    max_page_size: 100,
    code_prefix: "AQT",
    refresh_prefix: "AQX",
};

fn urn_kind(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::LinkedInCampaignGroup => "sponsoredCampaignGroup",
        ResourceType::LinkedInCampaign => "sponsoredCampaign",
        _ => "sponsoredCreative",
    }
}

/// `urn:li:<kind>:<id>` for a resource.
pub fn urn(resource_type: ResourceType, id: &str) -> String {
    if id.starts_with("urn:li:") {
        return id.to_string();
    }
    format!("urn:li:{}:{}", urn_kind(resource_type), id)
}

pub fn account_urn(account: &str) -> String {
    format!("urn:li:sponsoredAccount:{}", account)
}

/// Plural path segment of a collection.
pub fn from_collection(segment: &str) -> Option<ResourceType> {
    match segment {
        "adCampaignGroups" => Some(ResourceType::LinkedInCampaignGroup),
        "adCampaigns" => Some(ResourceType::LinkedInCampaign),
        "creatives" => Some(ResourceType::LinkedInCreative),
        _ => None,
    }
}

pub struct LinkedInAdapter;

impl PlatformAdapter for LinkedInAdapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::LinkedInCampaignGroup => GROUP_RULES,
            ResourceType::LinkedInCampaign => CAMPAIGN_RULES,
            ResourceType::LinkedInCreative => CREATIVE_RULES,
            _ => &[],
        }
    }

    fn violation_code(&self, constraint: &Constraint) -> String {
        match constraint {
            Constraint::Required => "REQUIRED_FIELD_MISSING",
            Constraint::NonEmpty => "FIELD_VALUE_TOO_SHORT",
            Constraint::OneOf(_) | Constraint::Elements(_) => "INVALID_VALUE_FOR_FIELD",
            Constraint::Positive => "FIELD_VALUE_TOO_LOW",
            Constraint::Immutable => "FIELD_NOT_UPDATABLE",
            Constraint::Reference(_) => "ENTITY_NOT_FOUND",
            Constraint::Format(_) => "INVALID_URN",
            Constraint::Precondition(_) => "INVALID_STATUS_TRANSITION",
        }
        .to_string()
    }

    /// Campaign groups and campaigns get numeric ids; creatives are
    /// identified by their URN.
    fn format_id(&self, resource_type: ResourceType, seq: u64) -> String {
        match resource_type {
            ResourceType::LinkedInCampaignGroup => (600_000_000 + seq).to_string(),
            ResourceType::LinkedInCampaign => (300_000_000 + seq).to_string(),
            _ => urn(resource_type, &(100_000_000 + seq).to_string()),
        }
    }

    fn reference_id(&self, target: ResourceType, raw: &Value) -> Option<String> {
        let rest = raw.as_str()?.strip_prefix("urn:li:")?;
        let (kind, id) = rest.split_once(':')?;
        if kind != urn_kind(target) || id.is_empty() {
            return None;
        }
        Some(match target {
            ResourceType::LinkedInCreative => raw.as_str()?.to_string(),
            _ => id.to_string(),
        })
    }

    fn normalize(&self, resource_type: ResourceType, mode: Mode, fields: &mut Map<String, Value>) {
        for owned in ["id", "account", "changeAuditStamps", "createdAt", "lastModifiedAt"] {
            fields.remove(owned);
        }
        if mode == Mode::Create {
            match resource_type {
                ResourceType::LinkedInCampaignGroup => default_field(fields, "status", "ACTIVE"),
                ResourceType::LinkedInCampaign => default_field(fields, "status", "DRAFT"),
                _ => default_field(fields, "intendedStatus", "DRAFT"),
            }
        }
    }

    fn delete_patch(&self, resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        let next = match resource.status() {
            Some("DRAFT") => "REMOVED",
            _ => "PENDING_DELETION",
        };
        let mut patch = Map::new();
        patch.insert(resource.resource_type.status_field().to_string(), json!(next));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        let id = match resource.id.parse::<u64>() {
            Ok(numeric) => json!(numeric),
            Err(_) => json!(resource.id),
        };
        out.insert("id".to_string(), id);
        if wanted(projection, "account") {
            out.insert("account".to_string(), json!(account_urn(&resource.scope)));
        }
        copy_fields(&mut out, resource, projection);
        let created = resource.created_at.timestamp_millis();
        let modified = resource.updated_at.timestamp_millis();
        if resource.resource_type == ResourceType::LinkedInCreative {
            if wanted(projection, "createdAt") {
                out.insert("createdAt".to_string(), json!(created));
            }
            if wanted(projection, "lastModifiedAt") {
                out.insert("lastModifiedAt".to_string(), json!(modified));
            }
        } else if wanted(projection, "changeAuditStamps") {
            out.insert(
                "changeAuditStamps".to_string(),
                json!({ "created": { "time": created }, "lastModified": { "time": modified } }),
            );
        }
        Value::Object(out)
    }

    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let status = err.status();
        let body = match err {
            ApiError::Validation(violation) => json!({
                "errorDetailType": "com.linkedin.common.error.BadRequest",
                "status": status,
                "code": "VALIDATION_FAILED",
                "message": format!("Validation failed: {}", violation.message()),
                "errorDetails": {
                    "inputErrors": [{
                        "code": violation.code,
                        "description": violation.message(),
                        "input": { "inputPath": { "fieldPath": format!("/{}", violation.field.replace('.', "/")) } },
                    }]
                },
            }),
            ApiError::Unauthenticated { reason } => {
                let (service_code, code, message) = match reason {
                    AuthFailure::Missing | AuthFailure::Empty => {
                        (65604, "EMPTY_ACCESS_TOKEN", "Empty oauth2 access token".to_string())
                    }
                    AuthFailure::MissingHeader(name) => (65600, "MISSING_HEADER", format!("Missing {} header", name)),
                    _ => (65600, "INVALID_ACCESS_TOKEN", "Invalid access token".to_string()),
                };
                json!({ "status": status, "serviceErrorCode": service_code, "code": code, "message": message })
            }
            _ => {
                let (service_code, code) = match err.kind() {
                    ErrorKind::Validation => (None, "BAD_REQUEST"),
                    ErrorKind::NotFound => (None, "NOT_FOUND"),
                    ErrorKind::Unauthenticated => (Some(65600), "INVALID_ACCESS_TOKEN"),
                    ErrorKind::Unauthorized => (Some(100), "ACCESS_DENIED"),
                    ErrorKind::RateLimited => (None, "TOO_MANY_REQUESTS"),
                    ErrorKind::Internal => (None, "INTERNAL_SERVER_ERROR"),
                };
                let mut body = Map::new();
                body.insert("status".to_string(), json!(status));
                if let Some(service_code) = service_code {
                    body.insert("serviceErrorCode".to_string(), json!(service_code));
                }
                body.insert("code".to_string(), json!(code));
                body.insert("message".to_string(), json!(err.public_message()));
                Value::Object(body)
            }
        };
        ErrorResponse::new(status, body)
    }
}

/// Checks the `Linkedin-Version` header. Returns the envelope to send when
/// the header is missing or names a version that is not served.
pub fn version_error(presented: Option<&str>, expected: &str) -> Option<ErrorResponse> {
    match presented.map(str::trim) {
        None | Some("") => Some(ErrorResponse::new(
            400,
            json!({
                "status": 400,
                "code": "VERSION_MISSING",
                "message": "A version must be present. Please specify a version by adding the LinkedIn-Version header.",
            }),
        )),
        Some(version) if version != expected => Some(ErrorResponse::new(
            426,
            json!({
                "status": 426,
                "code": "NONEXISTENT_VERSION",
                "message": format!("Requested version {} is not active", version),
            }),
        )),
        Some(_) => None,
    }
}

static CRITERION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\(values:List\(([^)]*)\)\)").expect("search criterion pattern is valid"));

/// Parses a rest.li finder expression such as
/// `(status:(values:List(ACTIVE,PAUSED)),campaignGroup:(values:List(urn%3Ali%3AsponsoredCampaignGroup%3A1)))`.
pub fn parse_search(search: &str) -> Result<Vec<FieldFilter>, ApiError> {
    let filters: Vec<FieldFilter> = CRITERION
        .captures_iter(search)
        .map(|criterion| {
            let values = criterion[2]
                .split(',')
                .map(|value| json!(value.trim().replace("%3A", ":").replace("%3a", ":")))
                .collect();
            FieldFilter::any_of(&criterion[1], values)
        })
        .collect();
    let trimmed = search.trim_matches(|c| c == '(' || c == ')').trim();
    if filters.is_empty() && !trimmed.is_empty() {
        return Err(ApiError::invalid_request(format!("invalid search expression: {}", search)));
    }
    Ok(filters)
}

/// Turns a rest.li `PARTIAL_UPDATE` body (`{"patch": {"$set": {..}}}`) into
/// a flat patch. Keys under `$delete` are nulled.
pub fn partial_update_patch(body: &Value) -> Result<Map<String, Value>, ApiError> {
    let patch = body
        .get("patch")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::invalid_request("PARTIAL_UPDATE body must contain a patch object"))?;
    let mut out = patch.get("$set").and_then(Value::as_object).cloned().unwrap_or_default();
    if let Some(deleted) = patch.get("$delete").and_then(Value::as_array) {
        for key in deleted.iter().filter_map(Value::as_str) {
            out.insert(key.to_string(), Value::Null);
        }
    }
    Ok(out)
}

/// `{elements, paging}` list body.
pub fn list_envelope(elements: Vec<Value>, page: &Page<Resource>, next_href: impl Fn(usize) -> String) -> Value {
    let links: Vec<Value> = page
        .next_offset()
        .map(|start| json!({ "rel": "next", "type": "application/json", "href": next_href(start) }))
        .into_iter()
        .collect();
    json!({
        "elements": elements,
        "paging": {
            "start": page.offset,
            "count": page.page_size,
            "total": page.total,
            "links": links,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_urns_of_the_right_kind() {
        let group = json!("urn:li:sponsoredCampaignGroup:600000001");
        assert_eq!(
            LinkedInAdapter.reference_id(ResourceType::LinkedInCampaignGroup, &group),
            Some("600000001".to_string())
        );
        assert_eq!(LinkedInAdapter.reference_id(ResourceType::LinkedInCampaign, &group), None);
        assert_eq!(LinkedInAdapter.reference_id(ResourceType::LinkedInCampaign, &json!("300000001")), None);
    }

    #[test]
    fn creatives_are_identified_by_urn() {
        let id = LinkedInAdapter.format_id(ResourceType::LinkedInCreative, 5);
        assert_eq!(id, "urn:li:sponsoredCreative:100000005");
        assert_eq!(LinkedInAdapter.format_id(ResourceType::LinkedInCampaign, 5), "300000005");
    }

    #[test]
    fn version_header_is_exact_match() {
        assert!(version_error(Some("202401"), "202401").is_none());
        assert_eq!(version_error(None, "202401").unwrap().status, 400);
        let resp = version_error(Some("202001"), "202401").unwrap();
        assert_eq!(resp.status, 426);
        assert_eq!(resp.body["code"], "NONEXISTENT_VERSION");
    }

    #[test]
    fn search_expression() {
        let filters =
            parse_search("(status:(values:List(ACTIVE,PAUSED)),campaignGroup:(values:List(urn%3Ali%3AsponsoredCampaignGroup%3A1)))")
                .unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0], FieldFilter::any_of("status", vec![json!("ACTIVE"), json!("PAUSED")]));
        assert_eq!(
            filters[1],
            FieldFilter::equals("campaignGroup", "urn:li:sponsoredCampaignGroup:1")
        );
        assert!(parse_search("status=ACTIVE").is_err());
        assert!(parse_search("()").unwrap().is_empty());
    }

    #[test]
    fn partial_update_bodies() {
        let patch = partial_update_patch(&json!({"patch": {"$set": {"status": "PAUSED"}, "$delete": ["unitCost"]}})).unwrap();
        assert_eq!(patch["status"], "PAUSED");
        assert!(patch["unitCost"].is_null());
        assert!(partial_update_patch(&json!({"status": "PAUSED"})).is_err());
    }

    #[test]
    fn validation_envelope_names_the_field_path() {
        let err = ApiError::validation("dailyBudget.amount", Constraint::Positive, "FIELD_VALUE_TOO_LOW");
        let resp = LinkedInAdapter.error_envelope(&err);
        assert_eq!(resp.status, 400);
        let input = &resp.body["errorDetails"]["inputErrors"][0];
        assert_eq!(input["code"], "FIELD_VALUE_TOO_LOW");
        assert_eq!(input["input"]["inputPath"]["fieldPath"], "/dailyBudget/amount");
    }
}
