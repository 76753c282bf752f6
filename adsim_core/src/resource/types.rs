//! Stored resource record and the tagged platform+resource type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::platform::Platform;

/// One variant per platform and resource kind. The platform is implied by
/// the variant, so a Meta campaign can never be confused with a TikTok one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    MetaCampaign,
    MetaAdSet,
    MetaAd,
    MetaAdCreative,
    GoogleAdsCampaignBudget,
    GoogleAdsCampaign,
    GoogleAdsAdGroup,
    GoogleAdsAdGroupAd,
    LinkedInCampaignGroup,
    LinkedInCampaign,
    LinkedInCreative,
    TikTokCampaign,
    TikTokAdGroup,
    TikTokAd,
    TradeDeskCampaign,
    TradeDeskAdGroup,
    TradeDeskCreative,
    Dv360Campaign,
    Dv360InsertionOrder,
    Dv360LineItem,
}

impl ResourceType {
    pub fn platform(&self) -> Platform {
        use ResourceType::*;
        match self {
            MetaCampaign | MetaAdSet | MetaAd | MetaAdCreative => Platform::Meta,
            GoogleAdsCampaignBudget | GoogleAdsCampaign | GoogleAdsAdGroup | GoogleAdsAdGroupAd => {
                Platform::GoogleAds
            }
            LinkedInCampaignGroup | LinkedInCampaign | LinkedInCreative => Platform::LinkedIn,
            TikTokCampaign | TikTokAdGroup | TikTokAd => Platform::TikTok,
            TradeDeskCampaign | TradeDeskAdGroup | TradeDeskCreative => Platform::TradeDesk,
            Dv360Campaign | Dv360InsertionOrder | Dv360LineItem => Platform::Dv360,
        }
    }

    /// The platform's own singular name for the resource.
    pub fn name(&self) -> &'static str {
        use ResourceType::*;
        match self {
            MetaCampaign => "campaign",
            MetaAdSet => "adset",
            MetaAd => "ad",
            MetaAdCreative => "adcreative",
            GoogleAdsCampaignBudget => "campaign_budget",
            GoogleAdsCampaign => "campaign",
            GoogleAdsAdGroup => "ad_group",
            GoogleAdsAdGroupAd => "ad_group_ad",
            LinkedInCampaignGroup => "adCampaignGroup",
            LinkedInCampaign => "adCampaign",
            LinkedInCreative => "creative",
            TikTokCampaign => "campaign",
            TikTokAdGroup => "adgroup",
            TikTokAd => "ad",
            TradeDeskCampaign => "Campaign",
            TradeDeskAdGroup => "AdGroup",
            TradeDeskCreative => "Creative",
            Dv360Campaign => "campaign",
            Dv360InsertionOrder => "insertionOrder",
            Dv360LineItem => "lineItem",
        }
    }

    /// Key the identifier is rendered under.
    pub fn id_field(&self) -> &'static str {
        use ResourceType::*;
        match self {
            TikTokCampaign => "campaign_id",
            TikTokAdGroup => "adgroup_id",
            TikTokAd => "ad_id",
            TradeDeskCampaign => "CampaignId",
            TradeDeskAdGroup => "AdGroupId",
            TradeDeskCreative => "CreativeId",
            Dv360Campaign => "campaignId",
            Dv360InsertionOrder => "insertionOrderId",
            Dv360LineItem => "lineItemId",
            _ => "id",
        }
    }

    /// Field holding the lifecycle status.
    pub fn status_field(&self) -> &'static str {
        use ResourceType::*;
        match self {
            LinkedInCreative => "intendedStatus",
            TikTokCampaign | TikTokAdGroup | TikTokAd => "operation_status",
            TradeDeskCampaign | TradeDeskAdGroup | TradeDeskCreative => "Availability",
            Dv360Campaign | Dv360InsertionOrder | Dv360LineItem => "entityStatus",
            _ => "status",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.platform(), self.name())
    }
}

/// A stored resource. Caller supplied attributes live in `fields`; the
/// identifier, scope and timestamps are owned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_type: ResourceType,
    /// Account, advertiser or customer the resource belongs to.
    pub scope: String,
    pub fields: Map<String, Value>,
    /// Allocation order, used for stable listing.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Resolves a dotted path (`budget.amount`) inside the stored fields.
    /// The type's id field resolves to the identifier itself.
    pub fn field(&self, path: &str) -> Option<Value> {
        if path == self.resource_type.id_field() {
            return Some(Value::String(self.id.clone()));
        }
        crate::validation::lookup(&self.fields, path).cloned()
    }

    pub fn status(&self) -> Option<&str> {
        self.fields
            .get(self.resource_type.status_field())
            .and_then(Value::as_str)
    }
}
