//! The Trade Desk API v3. Login exchanges credentials for a `TTD-Auth`
//! token; entities are created with POST, replaced with PUT and searched
//! through the `query` endpoints.

use adsim_core::platform::{adapter, trade_desk};
use adsim_core::resource::repository::{FieldFilter, ListQuery};
use adsim_core::{ApiError, Constraint, PageRequest, Platform, ResourceType, TokenRequest};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::{Map, Value, json};

use crate::extract::{authenticate, body_map, param, text, usize_param};
use crate::response::{ok, respond};
use crate::state::AppState;

const PLATFORM: Platform = Platform::TradeDesk;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/authentication", post(login))
        .route("/:kind", post(create_entity).put(update_entity))
        .route("/:kind/:id", get(read_entity))
        .route("/:kind/query/:by", post(query_entities))
}

fn kind_type(kind: &str) -> Result<ResourceType, ApiError> {
    trade_desk::from_segment(&kind.to_ascii_lowercase())
        .ok_or_else(|| ApiError::invalid_request(format!("unknown entity type: {}", kind)))
}

fn required(field: &str) -> ApiError {
    ApiError::validation(field, Constraint::Required, "ValidationFailed")
}

async fn login(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    respond(PLATFORM, issue_token(&state, &headers, &body).await)
}

/// `{Login, Password}` is a client credentials grant in disguise.
async fn issue_token(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    let params = body_map(headers, body)?;
    let login = param(&params, "Login").ok_or_else(|| required("Login"))?;
    let password = param(&params, "Password").ok_or_else(|| required("Password"))?;
    let request = TokenRequest {
        grant_type: "client_credentials".to_string(),
        client_id: login.to_string(),
        client_secret: Some(password.to_string()),
        ..TokenRequest::default()
    };
    let issued = state.engine.exchange(PLATFORM, &request).await?;
    Ok(ok(json!({ "Token": issued.access_token })))
}

/// Ad groups belong to the advertiser that owns their campaign. An unknown
/// campaign leaves the scope empty and is reported by validation.
async fn owning_advertiser(
    state: &AppState,
    resource_type: ResourceType,
    fields: &Map<String, Value>,
) -> Result<String, ApiError> {
    if resource_type != ResourceType::TradeDeskAdGroup {
        return Ok(text(fields, "AdvertiserId").unwrap_or_default());
    }
    let Some(campaign_id) = text(fields, "CampaignId") else {
        return Ok(String::new());
    };
    let campaign = state
        .service
        .repository()
        .find(ResourceType::TradeDeskCampaign, &campaign_id)
        .await?;
    Ok(campaign.map(|c| c.scope).unwrap_or_default())
}

async fn create_entity(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, create(&state, &kind, &headers, &body).await)
}

async fn create(state: &AppState, kind: &str, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let fields = body_map(headers, body)?;
    let scope = owning_advertiser(state, resource_type, &fields).await?;
    let created = state.service.create(resource_type, &scope, fields).await?;
    Ok(ok(adapter(PLATFORM).render(&created, None)))
}

async fn update_entity(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, update(&state, &kind, &headers, &body).await)
}

async fn update(state: &AppState, kind: &str, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let patch = body_map(headers, body)?;
    let id_field = resource_type.id_field();
    let id = text(&patch, id_field).ok_or_else(|| required(id_field))?;
    let updated = state.service.update(resource_type, None, &id, patch).await?;
    Ok(ok(adapter(PLATFORM).render(&updated, None)))
}

async fn read_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    respond(PLATFORM, read(&state, &kind, &id, &headers).await)
}

async fn read(state: &AppState, kind: &str, id: &str, headers: &HeaderMap) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let resource = state.service.get(resource_type, None, id).await?;
    Ok(ok(adapter(PLATFORM).render(&resource, None)))
}

async fn query_entities(
    State(state): State<AppState>,
    Path((kind, by)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, query(&state, &kind, &by, &headers, &body).await)
}

/// `query/advertiser` lists an advertiser's entities; `query/campaign`
/// lists the ad groups of one campaign.
async fn query(state: &AppState, kind: &str, by: &str, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let params = body_map(headers, body)?;

    let mut filters = Vec::new();
    let scope = match (by.to_ascii_lowercase().as_str(), resource_type) {
        ("advertiser", _) => text(&params, "AdvertiserId").ok_or_else(|| required("AdvertiserId"))?,
        ("campaign", ResourceType::TradeDeskAdGroup) => {
            let campaign_id = text(&params, "CampaignId").ok_or_else(|| required("CampaignId"))?;
            let campaign = state.service.get(ResourceType::TradeDeskCampaign, None, &campaign_id).await?;
            filters.push(FieldFilter::equals("CampaignId", campaign_id));
            campaign.scope
        }
        _ => return Err(ApiError::invalid_request(format!("unsupported query: {}/query/{}", kind, by))),
    };

    if let Some(terms) = params.get("SearchTerms").and_then(Value::as_array) {
        for term in terms.iter().filter_map(Value::as_str).filter(|t| !t.trim().is_empty()) {
            filters.push(FieldFilter::contains(trade_desk::name_field(resource_type), term.trim()));
        }
    }
    if let Some(availabilities) = params.get("Availabilities").and_then(Value::as_array) {
        if !availabilities.is_empty() {
            filters.push(FieldFilter::any_of("Availability", availabilities.clone()));
        }
    }

    let page = PageRequest::from_start_index(
        PLATFORM.profile(),
        usize_param(&params, "PageStartIndex")?,
        usize_param(&params, "PageSize")?,
    );
    let list_query = filters.into_iter().fold(ListQuery::new(page), ListQuery::filter);
    let page = state.service.list(resource_type, &scope, &list_query).await?;
    let unfiltered = state.service.repository().count(resource_type, &scope).await?;
    let result = page
        .items
        .iter()
        .map(|resource| adapter(PLATFORM).render(resource, None))
        .collect();
    Ok(ok(trade_desk::query_envelope(result, &page, unfiltered)))
}
