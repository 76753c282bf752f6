//! The Trade Desk API v3: campaigns, ad groups and creatives, PascalCase
//! throughout.

use serde_json::{Map, Value, json};

use super::{AuthScheme, Platform, PlatformAdapter, PlatformProfile, copy_fields, default_field, wanted};
use crate::error::{ApiError, Constraint, ErrorKind, ErrorResponse};
use crate::oauth::types::GrantType;
use crate::pagination::Page;
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{Mode, Rule};

pub const AVAILABILITIES: &[&str] = &["Available", "Archived"];
pub const PACING_MODES: &[&str] = &["PaceAhead", "PaceEvenly", "PaceToEndOfDay", "PaceToEndOfFlight"];
pub const CREATIVE_TYPES: &[&str] = &["Image", "Video", "Html5", "ThirdPartyTag", "Native", "Audio"];

const CAMPAIGN_RULES: &[Rule] = &[
    Rule::Required("AdvertiserId"),
    Rule::Required("CampaignName"),
    Rule::NonEmpty("CampaignName"),
    Rule::Required("Budget"),
    Rule::Required("Budget.Amount"),
    Rule::Positive("Budget.Amount"),
    Rule::Required("StartDate"),
    Rule::OneOf("PacingMode", PACING_MODES),
    Rule::OneOf("Availability", AVAILABILITIES),
    Rule::Positive("DailyBudget.Amount"),
    Rule::Immutable("AdvertiserId"),
];

const AD_GROUP_RULES: &[Rule] = &[
    Rule::Required("CampaignId"),
    Rule::Required("AdGroupName"),
    Rule::NonEmpty("AdGroupName"),
    Rule::Required("IndustryCategoryId"),
    Rule::OneOf("Availability", AVAILABILITIES),
    Rule::Positive("RTBAttributes.BaseBidCPM.Amount"),
    Rule::Positive("RTBAttributes.MaxBidCPM.Amount"),
    Rule::Positive("RTBAttributes.BudgetSettings.Budget.Amount"),
    Rule::Immutable("CampaignId"),
    Rule::Reference("CampaignId", ResourceType::TradeDeskCampaign),
];

const CREATIVE_RULES: &[Rule] = &[
    Rule::Required("AdvertiserId"),
    Rule::Required("CreativeName"),
    Rule::NonEmpty("CreativeName"),
    Rule::OneOf("CreativeType", CREATIVE_TYPES),
    Rule::OneOf("Availability", AVAILABILITIES),
    Rule::Immutable("AdvertiserId"),
];

static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::TradeDesk,
    auth_header: "ttd-auth",
    auth_scheme: AuthScheme::Raw,
    query_token_param: None,
    grant_types: &[GrantType::ClientCredentials],
    required_scope: None,
    exchange_requires_redirect: false,
    access_token_ttl: 86_400,
    refresh_token_ttl: None,
    token_type: "TTD-Auth",
    default_page_size: 100,
    max_page_size: 1000,
    code_prefix: "",
    refresh_prefix: "",
};

/// Lower-case path segment to resource type.
pub fn from_segment(segment: &str) -> Option<ResourceType> {
    match segment {
        "campaign" => Some(ResourceType::TradeDeskCampaign),
        "adgroup" => Some(ResourceType::TradeDeskAdGroup),
        "creative" => Some(ResourceType::TradeDeskCreative),
        _ => None,
    }
}

/// Field the query endpoints match `SearchTerms` against.
pub fn name_field(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::TradeDeskAdGroup => "AdGroupName",
        ResourceType::TradeDeskCreative => "CreativeName",
        _ => "CampaignName",
    }
}

/// Seven lower-case base-36 characters.
fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub struct TradeDeskAdapter;

impl PlatformAdapter for TradeDeskAdapter {
    fn profile(&self) -> &'static PlatformProfile {
        &PROFILE
    }

    fn rules(&self, resource_type: ResourceType) -> &'static [Rule] {
        match resource_type {
            ResourceType::TradeDeskCampaign => CAMPAIGN_RULES,
            ResourceType::TradeDeskAdGroup => AD_GROUP_RULES,
            ResourceType::TradeDeskCreative => CREATIVE_RULES,
            _ => &[],
        }
    }

    fn violation_code(&self, constraint: &Constraint) -> String {
        match constraint {
            Constraint::Reference(_) => "ReferencedEntityNotFound",
            Constraint::Immutable => "PropertyNotEditable",
            _ => "ValidationFailed",
        }
        .to_string()
    }

    fn format_id(&self, _resource_type: ResourceType, seq: u64) -> String {
        base36(seq + 36u64.pow(6))
    }

    fn normalize(&self, resource_type: ResourceType, mode: Mode, fields: &mut Map<String, Value>) {
        fields.remove(resource_type.id_field());
        fields.remove("CreatedAtUTC");
        fields.remove("LastUpdatedAtUTC");
        if mode == Mode::Create {
            default_field(fields, "Availability", "Available");
            if resource_type == ResourceType::TradeDeskCampaign {
                default_field(fields, "PacingMode", "PaceEvenly");
            }
        }
    }

    fn delete_patch(&self, _resource: &Resource) -> Result<Map<String, Value>, ApiError> {
        let mut patch = Map::new();
        patch.insert("Availability".to_string(), json!("Archived"));
        Ok(patch)
    }

    fn render(&self, resource: &Resource, projection: Option<&[String]>) -> Value {
        let mut out = Map::new();
        out.insert(resource.resource_type.id_field().to_string(), json!(resource.id));
        copy_fields(&mut out, resource, projection);
        if wanted(projection, "CreatedAtUTC") {
            out.insert("CreatedAtUTC".to_string(), json!(resource.created_at.to_rfc3339()));
        }
        if wanted(projection, "LastUpdatedAtUTC") {
            out.insert("LastUpdatedAtUTC".to_string(), json!(resource.updated_at.to_rfc3339()));
        }
        Value::Object(out)
    }

    fn error_envelope(&self, err: &ApiError) -> ErrorResponse {
        let status = err.status();
        let body = match err {
            ApiError::Validation(violation) => json!({
                "Message": "The request failed validation. Please check your request and try again.",
                "ErrorCode": violation.code,
                "ErrorDetails": [{
                    "Property": violation.field,
                    "Reasons": [format!("The {} field {}.", violation.field, violation.constraint)],
                }],
            }),
            ApiError::NotFound { resource_type, id } => json!({
                "Message": format!("{} with ID '{}' was not found.", resource_type.name(), id),
                "ErrorCode": "NotFound",
            }),
            _ => {
                let (code, message) = match err.kind() {
                    ErrorKind::Unauthenticated => ("AuthenticationFailed", "Authentication failed.".to_string()),
                    ErrorKind::Unauthorized => ("Forbidden", "You do not have permission to perform this action.".to_string()),
                    ErrorKind::RateLimited => ("TooManyRequests", "Rate limit exceeded. Please retry later.".to_string()),
                    ErrorKind::Validation => ("BadRequest", err.public_message()),
                    _ => ("InternalServerError", err.public_message()),
                };
                json!({ "Message": message, "ErrorCode": code })
            }
        };
        ErrorResponse::new(status, body)
    }
}

/// `{Result, ResultCount, TotalFilteredCount, TotalUnfilteredCount}` body of
/// the query endpoints.
pub fn query_envelope(result: Vec<Value>, page: &Page<Resource>, unfiltered: usize) -> Value {
    let count = result.len();
    json!({
        "Result": result,
        "ResultCount": count,
        "TotalFilteredCount": page.total,
        "TotalUnfilteredCount": unfiltered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_seven_base36_chars() {
        assert_eq!(TradeDeskAdapter.format_id(ResourceType::TradeDeskCampaign, 1), "1000001");
        assert_eq!(TradeDeskAdapter.format_id(ResourceType::TradeDeskCampaign, 35), "100000z");
        assert_eq!(TradeDeskAdapter.format_id(ResourceType::TradeDeskCampaign, 36).len(), 7);
    }

    #[test]
    fn validation_envelope_lists_property() {
        let err = ApiError::validation("CampaignName", Constraint::Required, "ValidationFailed");
        let resp = TradeDeskAdapter.error_envelope(&err);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["ErrorDetails"][0]["Property"], "CampaignName");
        assert_eq!(resp.body["ErrorDetails"][0]["Reasons"][0], "The CampaignName field is required.");
    }
}
