//! Display & Video 360 API v3: campaigns, insertion orders and line items
//! under an advertiser.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, rpc_status, wanted};
use crate::error::{ApiError, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::pagination::Page;
use crate::resource::repository::FieldFilter;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub const ENTITY_STATUSES: &[&str] = &[
    "ENTITY_STATUS_ACTIVE",
    "ENTITY_STATUS_ARCHIVED",
    "ENTITY_STATUS_DRAFT",
    "ENTITY_STATUS_PAUSED",
    "ENTITY_STATUS_SCHEDULED_FOR_DELETION",
];
pub const CAMPAIGN_GOAL_TYPES: &[&str] = &[
    "CAMPAIGN_GOAL_TYPE_APP_INSTALL",
    "CAMPAIGN_GOAL_TYPE_BRAND_AWARENESS",
    "CAMPAIGN_GOAL_TYPE_OFFLINE_ACTION",
    "CAMPAIGN_GOAL_TYPE_ONLINE_ACTION",
];
pub const BUDGET_UNITS: &[&str] = &["BUDGET_UNIT_CURRENCY", "BUDGET_UNIT_IMPRESSIONS"];
pub const LINE_ITEM_TYPES: &[&str] = &[
    "LINE_ITEM_TYPE_DISPLAY_DEFAULT",
    "LINE_ITEM_TYPE_DISPLAY_MOBILE_APP_INSTALL",
    "LINE_ITEM_TYPE_VIDEO_DEFAULT",
    "LINE_ITEM_TYPE_VIDEO_MOBILE_APP_INSTALL",
    "LINE_ITEM_TYPE_AUDIO_DEFAULT",
    "LINE_ITEM_TYPE_VIDEO_OVER_THE_TOP",
];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("displayName"),
    Rule::NonEmpty("displayName"),
    Rule::Required("entityStatus"),
    Rule::OneOf("entityStatus", ENTITY_STATUSES),
    Rule::Required("campaignGoal"),
    Rule::Required("campaignGoal.campaignGoalType"),
    Rule::OneOf("campaignGoal.campaignGoalType", CAMPAIGN_GOAL_TYPES),
    Rule::Required("campaignFlight"),
    Rule::Required("frequencyCap"),
];

const INSERTION_ORDER_RULES: &[Rule] = &[
    Rule::Required("campaignId"),
    Rule::Required("displayName"),
    Rule::NonEmpty("displayName"),
    Rule::Required("entityStatus"),
    Rule::OneOf("entityStatus", ENTITY_STATUSES),
    Rule::Required("pacing"),
    Rule::Required("frequencyCap"),
    Rule::Required("kpi"),
    Rule::Required("budget"),
    Rule::Required("budget.budgetUnit"),
    Rule::OneOf("budget.budgetUnit", BUDGET_UNITS),
    Rule::Required("budget.budgetSegments"),
    Rule::NonEmpty("budget.budgetSegments"),
    Rule::Immutable("campaignId"),
    Rule::Immutable("budget.budgetUnit"),
    Rule::Reference("campaignId", ResourceType::Dv360Campaign),
];

const LINE_ITEM_RULES: &[Rule] = &[
    Rule::Required("insertionOrderId"),
    Rule::Required("displayName"),
    Rule::NonEmpty("displayName"),
    Rule::Required("lineItemType"),
    Rule::OneOf("lineItemType", LINE_ITEM_TYPES),
    Rule::Required("entityStatus"),
    Rule::OneOf("entityStatus", ENTITY_STATUSES),
    Rule::Required("flight"),
    Rule::Required("budget"),
    Rule::Required("pacing"),
    Rule::Required("frequencyCap"),
    Rule::Required("partnerRevenueModel"),
    Rule::Required("bidStrategy"),
    Rule::Immutable("insertionOrderId"),
    Rule::Immutable("lineItemType"),
    Rule::Reference("insertionOrderId", ResourceType::Dv360InsertionOrder),
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::Dv360,
    auth_header: "authorization",
    auth_scheme: AuthScheme::Bearer,
    query_token_param: None,
    grant_types: &[GrantType::AuthorizationCode, GrantType::RefreshToken],
    required_scope: Some("display-video"),
    exchange_requires_redirect: true,
    access_token_ttl: 3599,
    refresh_token_ttl: None,
    token_type: "Bearer",
    default_page_size: 100,
    max_page_size: 200,
    code_prefix: "4/0A",
    refresh_prefix: "1//0e",
};

/// Plural path segment, also the key of list responses.
pub fn collection(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Dv360Campaign => "campaigns",
        ResourceType::Dv360InsertionOrder => "insertionOrders",
        _ => "lineItems",
    }
}

pub fn from_collection(segment: &str) -> Option<ResourceType> {
    match segment {
        "campaigns" => Some(ResourceType::Dv360Campaign),
        "insertionOrders" => Some(ResourceType::Dv360InsertionOrder),
        "lineItems" => Some(ResourceType::Dv360LineItem),
        _ => None,
    }
}

/// `advertisers/{a}/{collection}/{id}`.
pub fn resource_name(resource: &Resource) -> String {
    format!("advertisers/{}/{}/{}", resource.scope, collection(resource.resource_type), resource.id)
}

pub struct Dv360Adapter;

impl PlatformAdapter for Dv360Adapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::Dv360Campaign => CAMPAIGN_RULES,
            ResourceType::Dv360InsertionOrder => INSERTION_ORDER_RULES,
            ResourceType::Dv360LineItem => LINE_ITEM_RULES,
            _ => &[],
        }
    }

    fn violation_code(&self, constraint: &Constraint) -> String {
        match constraint {
            Constraint::Precondition(_) => "FAILED_PRECONDITION",
            _ => "INVALID_ARGUMENT",
        }
        .to_string()
    }

    fn format_id(&self, _resource_type: ResourceType, seq: u64) -> String {
        (1_000_000 + seq).to_string()
    }

    fn normalize(&self, resource_type: ResourceType, _mode: Mode, fields: &mut Map<String, Value>) {
        fields.remove(resource_type.id_field());
        for owned in ["name", "advertiserId", "updateTime"] {
            fields.remove(owned);
        }
    }

    /// Only archived entities can be deleted.
    fn delete_patch(&self, resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        if resource.status() != Some("ENTITY_STATUS_ARCHIVED") {
            let constraint = Constraint::Precondition("ENTITY_STATUS_ARCHIVED");
            let code = self.violation_code(&constraint);
            return Err(ApiError::validation("entityStatus", constraint, code));
        }
        let mut patch = Map::new();
        patch.insert("entityStatus".to_string(), json!("ENTITY_STATUS_SCHEDULED_FOR_DELETION"));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        out.insert("name".to_string(), json!(resource_name(resource)));
        if wanted(projection, "advertiserId") {
            out.insert("advertiserId".to_string(), json!(resource.scope));
        }
        out.insert(resource.resource_type.id_field().to_string(), json!(resource.id));
        copy_fields(&mut out, resource, projection);
        if wanted(projection, "updateTime") {
            out.insert("updateTime".to_string(), json!(resource.updated_at.to_rfc3339()));
        }
        Value::Object(out)
    }

    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let status = err.status();
        let (message, rpc, details) = match err {
            ApiError::Validation(violation) => (
                format!("Invalid value at '{}': {}", violation.field, violation.message()),
                match violation.code.as_str() {
                    "FAILED_PRECONDITION" => "FAILED_PRECONDITION",
                    _ => rpc_status(status),
                },
                json!([{
                    "@type": "type.googleapis.com/google.rpc.BadRequest",
                    "fieldViolations": [{ "field": violation.field, "description": violation.message() }],
                }]),
            ),
            _ => {
                let message = match err.kind() {
                    ErrorKind::NotFound => "Requested entity was not found.".to_string(),
                    ErrorKind::Unauthenticated => "Request had invalid authentication credentials. Expected OAuth 2 access token, login cookie or other valid authentication credential.".to_string(),
                    ErrorKind::Unauthorized => "The caller does not have permission".to_string(),
                    ErrorKind::RateLimited => "Quota exceeded.".to_string(),
                    ErrorKind::Validation => err.public_message(),
                    ErrorKind::Internal => "Internal error encountered.".to_string(),
                };
                (message, rpc_status(status), json!([]))
            }
        };
        ErrorResponse::new(
            status,
            json!({
                "error": {
                    "code": status,
                    "message": message,
                    "status": rpc,
                    "details": details,
                }
            }),
        )
    }
}

static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\(?\s*(?P<field>[A-Za-z][\w.]*)\s*[=:]\s*"?(?P<value>[^"()]*?)"?\s*\)?\s*$"#)
        .expect("filter term pattern is valid")
});

/// Parses the list `filter` grammar: `field="value"` terms joined by `AND`,
/// where one `AND` operand may be an `OR` group over a single field.
pub fn parse_filter(filter: &str) -> Result<Vec<FieldFilter>, ApiError> {
    let mut filters = Vec::new();
    for conjunct in filter.split(" AND ").map(str::trim).filter(|c| !c.is_empty()) {
        let mut path: Option<String> = None;
        let mut values = Vec::new();
        for term in conjunct.trim_matches(|c| c == '(' || c == ')').split(" OR ") {
            let parts = TERM
                .captures(term)
                .ok_or_else(|| ApiError::invalid_request(format!("invalid filter term: {}", term.trim())))?;
            let field = parts["field"].to_string();
            if path.as_ref().is_some_and(|p| *p != field) {
                return Err(ApiError::invalid_request("OR may only combine restrictions on the same field"));
            }
            path = Some(field);
            values.push(json!(&parts["value"]));
        }
        if let Some(path) = path {
            filters.push(FieldFilter::any_of(path, values));
        }
    }
    Ok(filters)
}

/// Keeps only the top-level keys named in `updateMask`.
pub fn masked_patch(body: &Map<String, Value>, update_mask: Option<&str>) -> Result<Map<String, Value>, ApiError> {
    let mask = update_mask
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::validation("updateMask", Constraint::Required, "INVALID_ARGUMENT"))?;
    let mut patch = Map::new();
    for path in mask.split(',').map(str::trim) {
        let top = path.split('.').next().unwrap_or(path);
        let value = body.get(top).cloned().unwrap_or(Value::Null);
        patch.insert(top.to_string(), value);
    }
    Ok(patch)
}

/// `{<collection>: [...], nextPageToken?}`. Empty listings are `{}`.
pub fn list_envelope(resource_type: ResourceType, items: Vec<Value>, page: &Page<Resource>) -> Value {
    let mut out = Map::new();
    if !items.is_empty() {
        out.insert(collection(resource_type).to_string(), Value::Array(items));
    }
    if let Some(token) = &page.next_cursor {
        out.insert("nextPageToken".to_string(), json!(token));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource(status: &str) -> Resource {
        let mut fields = Map::new();
        fields.insert("entityStatus".to_string(), json!(status));
        Resource {
            id: "1000001".into(),
            resource_type: ResourceType::Dv360Campaign,
            scope: "42".into(),
            fields,
            seq: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn only_archived_entities_can_be_deleted() {
        let err = Dv360Adapter.delete_patch(&resource("ENTITY_STATUS_ACTIVE")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref v) if v.code == "FAILED_PRECONDITION"));
        let envelope = Dv360Adapter.error_envelope(&err);
        assert_eq!(envelope.status, 400);
        assert_eq!(envelope.body["error"]["status"], "FAILED_PRECONDITION");
        let patch = Dv360Adapter.delete_patch(&resource("ENTITY_STATUS_ARCHIVED")).unwrap();
        assert_eq!(patch["entityStatus"], "ENTITY_STATUS_SCHEDULED_FOR_DELETION");
    }

    #[test]
    fn renders_resource_name() {
        let rendered = Dv360Adapter.render(&resource("ENTITY_STATUS_ACTIVE"), None);
        assert_eq!(rendered["name"], "advertisers/42/campaigns/1000001");
        assert_eq!(rendered["campaignId"], "1000001");
    }

    #[test]
    fn filter_grammar() {
        let filters = parse_filter(
            r#"(entityStatus="ENTITY_STATUS_ACTIVE" OR entityStatus="ENTITY_STATUS_PAUSED") AND campaignId="1000001""#,
        )
        .unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[0],
            FieldFilter::any_of("entityStatus", vec![json!("ENTITY_STATUS_ACTIVE"), json!("ENTITY_STATUS_PAUSED")])
        );
        assert_eq!(filters[1], FieldFilter::equals("campaignId", "1000001"));
        assert!(parse_filter(r#"entityStatus="A" OR campaignId="1""#).is_err());
        assert!(parse_filter("").unwrap().is_empty());
    }

    #[test]
    fn update_mask_selects_top_level_keys() {
        let body = json!({"displayName": "B", "entityStatus": "ENTITY_STATUS_PAUSED"});
        let patch = masked_patch(body.as_object().unwrap(), Some("displayName")).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch["displayName"], "B");
        assert!(masked_patch(body.as_object().unwrap(), None).is_err());
    }
}
