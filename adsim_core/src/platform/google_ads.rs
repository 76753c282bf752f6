//! Google Ads API: budgets, campaigns, ad groups and ads addressed by
//! resource name, mutated in batches and read back through GAQL.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, default_field, rpc_status, wanted};
use crate::error::{ApiError, AuthFailure, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::resource::repository::FieldFilter;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub const API_VERSION: &str = "v16";
pub const CAMPAIGN_STATUSES: &[&str] = &["ENABLED", "PAUSED", "REMOVED"];
pub const BUDGET_STATUSES: &[&str] = &["ENABLED", "REMOVED"];
pub const DELIVERY_METHODS: &[&str] = &["STANDARD", "ACCELERATED"];
pub const CHANNEL_TYPES: &[&str] = &[
    "SEARCH",
    "DISPLAY",
    "SHOPPING",
    "VIDEO",
    "MULTI_CHANNEL",
    "PERFORMANCE_MAX",
    "DEMAND_GEN",
];
pub const AD_GROUP_TYPES: &[&str] = &[
    "SEARCH_STANDARD",
    "DISPLAY_STANDARD",
    "SHOPPING_PRODUCT_ADS",
    "VIDEO_TRUE_VIEW_IN_STREAM",
    "VIDEO_BUMPER",
];

const BUDGET_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("amountMicros"),
    Rule::Positive("amountMicros"),
    Rule::OneOf("deliveryMethod", DELIVERY_METHODS),
    Rule::OneOf("status", BUDGET_STATUSES),
];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("advertisingChannelType"),
    Rule::OneOf("advertisingChannelType", CHANNEL_TYPES),
    Rule::OneOf("status", CAMPAIGN_STATUSES),
    Rule::Required("campaignBudget"),
    Rule::Immutable("advertisingChannelType"),
    Rule::Reference("campaignBudget", ResourceType::GoogleAdsCampaignBudget),
];

const AD_GROUP_RULES: &[Rule] = &[
    Rule::Required("name"),
    Rule::NonEmpty("name"),
    Rule::Required("campaign"),
    Rule::OneOf("status", CAMPAIGN_STATUSES),
    Rule::OneOf("type", AD_GROUP_TYPES),
    Rule::Positive("cpcBidMicros"),
    Rule::Immutable("campaign"),
    Rule::Reference("campaign", ResourceType::GoogleAdsCampaign),
];

const AD_GROUP_AD_RULES: &[Rule] = &[
    Rule::Required("adGroup"),
    Rule::Required("ad"),
    Rule::NonEmpty("ad"),
    Rule::OneOf("status", CAMPAIGN_STATUSES),
    Rule::Immutable("adGroup"),
    Rule::Reference("adGroup", ResourceType::GoogleAdsAdGroup),
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::GoogleAds,
    auth_header: "authorization",
    auth_scheme: AuthScheme::Bearer,
    query_token_param: None,
    grant_types: &[GrantType::AuthorizationCode, GrantType::RefreshToken],
    required_scope: Some("adwords"),
    exchange_requires_redirect: true,
    access_token_ttl: 3599,
    refresh_token_ttl: None,
    token_type: "Bearer",
    default_page_size: 1000,
    max_page_size: 10_000,
    code_prefix: "4/0A",
    refresh_prefix: "1//0g",
};

/// Plural path segment used in resource names and mutate URLs.
pub fn collection(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::GoogleAdsCampaignBudget => "campaignBudgets",
        ResourceType::GoogleAdsCampaign => "campaigns",
        ResourceType::GoogleAdsAdGroup => "adGroups",
        _ => "adGroupAds",
    }
}

pub fn from_collection(segment: &str) -> Option<ResourceType> {
    match segment {
        "campaignBudgets" => Some(ResourceType::GoogleAdsCampaignBudget),
        "campaigns" => Some(ResourceType::GoogleAdsCampaign),
        "adGroups" => Some(ResourceType::GoogleAdsAdGroup),
        "adGroupAds" => Some(ResourceType::GoogleAdsAdGroupAd),
        _ => None,
    }
}

/// `customers/{cid}/{collection}/{id}`.
pub fn resource_name(resource: &Resource) -> String {
    format!("customers/{}/{}/{}", resource.scope, collection(resource.resource_type), resource.id)
}

/// Splits a resource name into customer, type and id.
pub fn parse_resource_name(name: &str) -> Option<(&str, ResourceType, &str)> {
    let mut parts = name.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("customers"), Some(customer), Some(segment), Some(id), None) if !id.is_empty() => {
            Some((customer, from_collection(segment)?, id))
        }
        _ => None,
    }
}

/// Customer ids may be sent with dashes (`123-456-7890`).
pub fn customer_scope(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-').collect()
}

pub struct GoogleAdsAdapter;

impl PlatformAdapter for GoogleAdsAdapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::GoogleAdsCampaignBudget => BUDGET_RULES,
            ResourceType::GoogleAdsCampaign => CAMPAIGN_RULES,
            ResourceType::GoogleAdsAdGroup => AD_GROUP_RULES,
            ResourceType::GoogleAdsAdGroupAd => AD_GROUP_AD_RULES,
            _ => &[],
        }
    }

    /// `<errorType>.<enum value>`, split into the `errorCode` object by the
    /// envelope.
    fn violation_code(&self, constraint: &Constraint) -> String {
        match constraint {
            Constraint::Required => "fieldError.REQUIRED",
            Constraint::NonEmpty => "stringLengthError.EMPTY",
            Constraint::OneOf(_) => "requestError.INVALID_ENUM_VALUE",
            Constraint::Positive => "rangeError.TOO_LOW",
            Constraint::Elements(_) => "fieldError.INVALID_VALUE",
            Constraint::Immutable => "fieldError.IMMUTABLE_FIELD",
            Constraint::Reference(_) => "mutateError.RESOURCE_NOT_FOUND",
            Constraint::Format(_) => "requestError.INVALID_RESOURCE_NAME",
            Constraint::Precondition(_) => "operationAccessDeniedError.OPERATION_NOT_PERMITTED_FOR_REMOVED_RESOURCE",
        }
        .to_string()
    }

    fn format_id(&self, _resource_type: ResourceType, seq: u64) -> String {
        (20_000_000_000 + seq).to_string()
    }

    /// Parents are referenced by resource name only.
    fn reference_id(&self, target: ResourceType, raw: &Value) -> Option<String> {
        let (_, resource_type, id) = parse_resource_name(raw.as_str()?)?;
        (resource_type == target).then(|| id.to_string())
    }

    fn normalize(&self, resource_type: ResourceType, mode: Mode, fields: &mut Map<String, Value>) {
        fields.remove("id");
        fields.remove("resourceName");
        if mode == Mode::Create {
            default_field(fields, "status", "ENABLED");
            if resource_type == ResourceType::GoogleAdsCampaignBudget {
                default_field(fields, "deliveryMethod", "STANDARD");
            }
        }
    }

    fn delete_patch(&self, resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        if resource.status() == Some("REMOVED") {
            return Err(ApiError::validation(
                "resourceName",
                Constraint::Precondition("not removed"),
                self.violation_code(&Constraint::Precondition("not removed")),
            ));
        }
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!("REMOVED"));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        out.insert("resourceName".to_string(), json!(resource_name(resource)));
        if wanted(projection, "id") {
            out.insert("id".to_string(), json!(resource.id));
        }
        copy_fields(&mut out, resource, projection);
        Value::Object(out)
    }

    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let status = err.status();
        let (error_type, value, location) = match err {
            ApiError::Validation(violation) => {
                let (error_type, value) = split_code(&violation.code);
                (error_type.to_string(), value.to_string(), Some(violation.field.clone()))
            }
            ApiError::Unauthenticated { reason } => {
                let value = match reason {
                    AuthFailure::MissingHeader(_) => "DEVELOPER_TOKEN_PARAMETER_MISSING",
                    AuthFailure::Invalid => "OAUTH_TOKEN_INVALID",
                    _ => "OAUTH_TOKEN_HEADER_INVALID",
                };
                let error_type = if matches!(reason, AuthFailure::MissingHeader(_)) {
                    "requestError"
                } else {
                    "authenticationError"
                };
                (error_type.to_string(), value.to_string(), None)
            }
            ApiError::NotFound { .. } => ("mutateError".into(), "RESOURCE_NOT_FOUND".into(), None),
            _ => {
                let (error_type, value) = match err.kind() {
                    ErrorKind::Validation => ("requestError", "INVALID_INPUT"),
                    ErrorKind::Unauthenticated => ("authenticationError", "AUTHENTICATION_ERROR"),
                    ErrorKind::Unauthorized => ("authorizationError", "USER_PERMISSION_DENIED"),
                    ErrorKind::RateLimited => ("quotaError", "RESOURCE_EXHAUSTED"),
                    _ => ("internalError", "INTERNAL_ERROR"),
                };
                (error_type.to_string(), value.to_string(), None)
            }
        };

        let mut failure = Map::new();
        let mut error_code = Map::new();
        error_code.insert(error_type, json!(value));
        failure.insert("errorCode".to_string(), Value::Object(error_code));
        failure.insert("message".to_string(), json!(err.public_message()));
        if let Some(field) = location {
            let elements: Vec<Value> = field.split('.').map(|name| json!({ "fieldName": name })).collect();
            failure.insert("location".to_string(), json!({ "fieldPathElements": elements }));
        }
        failure_response(status, err, vec![Value::Object(failure)])
    }
}

/// Envelope for a failed operation inside a mutate batch. The location is
/// prefixed with `operations[index].<verb>`.
pub fn mutate_failure(err: &ApiError, index: usize, verb: &str) -> ErrorResponse {
    let mut response = GoogleAdsAdapter.error_envelope(err);
    let prefix = vec![json!({ "fieldName": "operations", "index": index }), json!({ "fieldName": verb })];
    if let Some(errors) = response.body["error"]["details"][0]["errors"].as_array_mut() {
        for error in errors {
            let tail = error["location"]["fieldPathElements"].as_array().cloned().unwrap_or_default();
            let mut elements = prefix.clone();
            elements.extend(tail);
            error["location"] = json!({ "fieldPathElements": elements });
        }
    }
    response
}

fn failure_response(status: u16, err: &ApiError, errors: Vec<Value>) -> ErrorResponse {
    let message = match err.kind() {
        ErrorKind::Validation | ErrorKind::NotFound => "Request contains an invalid argument.".to_string(),
        ErrorKind::Unauthenticated => "Request had invalid authentication credentials.".to_string(),
        _ => err.public_message(),
    };
    ErrorResponse::new(
        status,
        json!({
            "error": {
                "code": status,
                "message": message,
                "status": rpc_status(status),
                "details": [{
                    "@type": format!("type.googleapis.com/google.ads.googleads.{}.errors.GoogleAdsFailure", API_VERSION),
                    "errors": errors,
                    "requestId": request_id(),
                }],
            }
        }),
    )
}

fn split_code(code: &str) -> (&str, &str) {
    code.split_once('.').unwrap_or(("requestError", code))
}

fn request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(22);
    id
}

/// A parsed GAQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub resource_type: ResourceType,
    /// Selected fields, translated to stored (camelCase) keys.
    pub fields: Vec<String>,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<usize>,
}

static STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(?P<select>.+?)\s+FROM\s+(?P<from>\w+)(?:\s+WHERE\s+(?P<where>.+?))?(?:\s+ORDER\s+BY\s+.+?)?(?:\s+LIMIT\s+(?P<limit>\d+))?\s*$",
    )
    .expect("statement pattern is valid")
});

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*(?P<field>[\w.]+)\s*(?:(?P<eq>=)\s*(?P<value>'[^']*'|"[^"]*"|[\w.-]+)|IN\s*\((?P<list>[^)]*)\))\s*$"#)
        .expect("condition pattern is valid")
});

static AND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("AND pattern is valid"));

/// Parses the supported GAQL subset:
/// `SELECT a.b, ... FROM r [WHERE f = 'v' [AND f IN ('x', 'y')]] [ORDER BY ..] [LIMIT n]`.
pub fn parse_query(query: &str) -> Result<SearchQuery, ApiError> {
    let captures = STATEMENT
        .captures(query)
        .ok_or_else(|| ApiError::invalid_request("query is not a valid GAQL statement"))?;
    let from = &captures["from"];
    let resource_type = gaql_resource(from)
        .ok_or_else(|| ApiError::invalid_request(format!("unsupported resource in FROM clause: {}", from)))?;

    let fields = captures["select"]
        .split(',')
        .map(|field| field_key(from, field.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut filters = Vec::new();
    if let Some(clause) = captures.name("where") {
        for condition in AND.split(clause.as_str()) {
            let parts = CONDITION
                .captures(condition)
                .ok_or_else(|| ApiError::invalid_request(format!("unsupported condition: {}", condition.trim())))?;
            let path = field_key(from, &parts["field"])?;
            let values: Vec<Value> = match parts.name("eq") {
                Some(_) => vec![literal(&parts["value"])],
                None => parts["list"].split(',').map(|v| literal(v.trim())).collect(),
            };
            filters.push(FieldFilter::any_of(path, values));
        }
    }

    let limit = captures.name("limit").and_then(|l| l.as_str().parse().ok());
    Ok(SearchQuery { resource_type, fields, filters, limit })
}

fn gaql_resource(name: &str) -> Option<ResourceType> {
    match name {
        "campaign_budget" => Some(ResourceType::GoogleAdsCampaignBudget),
        "campaign" => Some(ResourceType::GoogleAdsCampaign),
        "ad_group" => Some(ResourceType::GoogleAdsAdGroup),
        "ad_group_ad" => Some(ResourceType::GoogleAdsAdGroupAd),
        _ => None,
    }
}

/// `campaign.advertising_channel_type` -> `advertisingChannelType`.
fn field_key(resource: &str, field: &str) -> Result<String, ApiError> {
    let rest = field
        .strip_prefix(resource)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("field {} cannot be selected from {}", field, resource)))?;
    Ok(rest.split('.').map(camel_case).collect::<Vec<_>>().join("."))
}

fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn literal(raw: &str) -> Value {
    let unquoted = raw.trim_matches(|c| c == '\'' || c == '"');
    if unquoted.len() != raw.len() {
        return json!(unquoted);
    }
    match raw.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(raw),
    }
}

/// Wraps rendered resources as GAQL rows keyed by the FROM resource.
pub fn search_row(resource_type: ResourceType, rendered: Value) -> Value {
    let mut row = Map::new();
    row.insert(camel_case(resource_type.name()), rendered);
    Value::Object(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::repository::FilterOp;

    #[test]
    fn resource_names_round_trip() {
        let (customer, resource_type, id) = parse_resource_name("customers/123/campaignBudgets/456").unwrap();
        assert_eq!(customer, "123");
        assert_eq!(resource_type, ResourceType::GoogleAdsCampaignBudget);
        assert_eq!(id, "456");
        assert!(parse_resource_name("customers/123/bananas/1").is_none());
        assert!(parse_resource_name("456").is_none());
    }

    #[test]
    fn references_must_name_the_right_collection() {
        let raw = json!("customers/1/campaigns/9");
        assert_eq!(
            GoogleAdsAdapter.reference_id(ResourceType::GoogleAdsCampaign, &raw),
            Some("9".to_string())
        );
        assert_eq!(GoogleAdsAdapter.reference_id(ResourceType::GoogleAdsAdGroup, &raw), None);
    }

    #[test]
    fn gaql_subset() {
        let query = parse_query(
            "SELECT campaign.id, campaign.name, campaign.advertising_channel_type FROM campaign \
             WHERE campaign.status = 'ENABLED' AND campaign.id IN (1, 2) ORDER BY campaign.id LIMIT 5",
        )
        .unwrap();
        assert_eq!(query.resource_type, ResourceType::GoogleAdsCampaign);
        assert_eq!(query.fields, vec!["id", "name", "advertisingChannelType"]);
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].path, "status");
        assert_eq!(query.filters[1].op, FilterOp::In(vec![json!(1), json!(2)]));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn gaql_rejects_foreign_fields() {
        assert!(parse_query("SELECT metrics.clicks FROM campaign").is_err());
        assert!(parse_query("SELECT campaign.id FROM customer").is_err());
        assert!(parse_query("DELETE FROM campaign").is_err());
    }

    #[test]
    fn validation_errors_carry_typed_codes() {
        let err = ApiError::validation("name", Constraint::Required, "fieldError.REQUIRED");
        let resp = GoogleAdsAdapter.error_envelope(&err);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"]["status"], "INVALID_ARGUMENT");
        let failure = &resp.body["error"]["details"][0]["errors"][0];
        assert_eq!(failure["errorCode"]["fieldError"], "REQUIRED");
        assert_eq!(failure["location"]["fieldPathElements"][0]["fieldName"], "name");

        let resp = mutate_failure(&err, 2, "create");
        let elements = &resp.body["error"]["details"][0]["errors"][0]["location"]["fieldPathElements"];
        assert_eq!(elements[0]["index"], 2);
        assert_eq!(elements[2]["fieldName"], "name");
    }
}
