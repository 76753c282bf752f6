//! Graph API: `/{version}/act_{account}/{edge}` collections and the generic
//! `/{version}/{id}` object node.

use adsim_core::platform::{adapter, meta};
use adsim_core::resource::repository::{FieldFilter, ListQuery};
use adsim_core::{ApiError, PageRequest, Platform, ResourceType};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use serde_json::{Map, Value, json};

use crate::extract::{authenticate, body_map, field_list, param, query_map, usize_param};
use crate::response::{ok, respond, respond_oauth};
use crate::state::AppState;

const PLATFORM: Platform = Platform::Meta;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dialog/oauth", get(dialog))
        .route("/:version/oauth/access_token", get(access_token).post(access_token))
        .route("/:version/:node", get(read_node).post(update_node).delete(delete_node))
        .route("/:version/:node/:edge", get(list_edge).post(create_on_edge))
}

fn edge_type(edge: &str) -> Result<ResourceType, ApiError> {
    match edge {
        "campaigns" => Ok(ResourceType::MetaCampaign),
        "adsets" => Ok(ResourceType::MetaAdSet),
        "ads" => Ok(ResourceType::MetaAd),
        "adcreatives" => Ok(ResourceType::MetaAdCreative),
        other => Err(ApiError::invalid_request(format!("Unknown path components: /{}", other))),
    }
}

fn account(node: &str) -> Result<&str, ApiError> {
    node.strip_prefix("act_")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("{} is not an ad account node", node)))
}

/// Graph request modifiers. They steer the call and are never stored.
const RESERVED_PARAMS: &[&str] = &[
    "access_token",
    "appsecret_proof",
    "fields",
    "limit",
    "after",
    "before",
    "method",
    "format",
    "pretty",
    "suppress_http_code",
];

/// Query and body parameters merged, body winning, request modifiers
/// stripped.
fn parameters(headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    let mut params = query_map(query);
    params.extend(body_map(headers, body)?);
    params.retain(|key, _| !RESERVED_PARAMS.contains(&key.as_str()));
    Ok(params)
}

async fn dialog(State(state): State<AppState>, headers: HeaderMap, RawQuery(query): RawQuery) -> Response {
    let mut params = query_map(query.as_deref());
    params
        .entry("response_type")
        .or_insert_with(|| Value::String("code".to_string()));
    respond_oauth(super::authorize(&state, PLATFORM, &headers, params).await)
}

async fn access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    respond_oauth(exchange(&state, &headers, query.as_deref(), &body).await)
}

/// The Graph token endpoint infers the grant from the parameters present.
async fn exchange(state: &AppState, headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> Result<Response, ApiError> {
    let mut params = query_map(query);
    params.extend(body_map(headers, body)?);
    if param(&params, "grant_type").is_none() {
        let inferred = if param(&params, "code").is_some() {
            "authorization_code"
        } else if param(&params, "refresh_token").is_some() {
            "refresh_token"
        } else {
            "client_credentials"
        };
        params.insert("grant_type".to_string(), Value::String(inferred.to_string()));
    }
    super::token(state, PLATFORM, headers, params).await
}

async fn create_on_edge(
    State(state): State<AppState>,
    Path((_version, node, edge)): Path<(String, String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    respond(PLATFORM, create(&state, &node, &edge, &headers, query.as_deref(), &body).await)
}

async fn create(
    state: &AppState,
    node: &str,
    edge: &str,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, query).await?;
    let resource_type = edge_type(edge)?;
    let account = account(node)?;
    let fields = parameters(headers, query, body)?;
    let created = state.service.create(resource_type, account, fields).await?;
    Ok(ok(json!({ "id": created.id })))
}

async fn list_edge(
    State(state): State<AppState>,
    Path((version, node, edge)): Path<(String, String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    respond(PLATFORM, list(&state, &version, &node, &edge, &headers, query.as_deref()).await)
}

async fn list(
    state: &AppState,
    version: &str,
    node: &str,
    edge: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, query).await?;
    let resource_type = edge_type(edge)?;
    let account = account(node)?;
    let params = query_map(query);

    let page = PageRequest::from_cursor(PLATFORM.profile(), param(&params, "after"), usize_param(&params, "limit")?)?;
    let fields = field_list(param(&params, "fields"));
    let mut list_query = ListQuery::new(page).project(fields.clone());
    if let Some(raw) = param(&params, "effective_status") {
        let statuses: Vec<Value> = serde_json::from_str(raw)
            .map_err(|_| ApiError::invalid_request("effective_status must be a JSON array"))?;
        list_query = list_query.filter(FieldFilter::any_of("status", statuses));
    }

    let page = state.service.list(resource_type, account, &list_query).await?;
    let data = page
        .items
        .iter()
        .map(|resource| adapter(PLATFORM).render(resource, fields.as_deref()))
        .collect();
    let page_size = page.page_size;
    Ok(ok(meta::list_envelope(data, &page, |after| {
        format!("/meta/{}/act_{}/{}?limit={}&after={}", version, account, edge, page_size, after)
    })))
}

async fn read_node(
    State(state): State<AppState>,
    Path((_version, node)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    respond(PLATFORM, read(&state, &node, &headers, query.as_deref()).await)
}

async fn read(state: &AppState, id: &str, headers: &HeaderMap, query: Option<&str>) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, query).await?;
    let params = query_map(query);
    let fields = field_list(param(&params, "fields"));
    let resource = state.service.find_any(meta::LOOKUP_ORDER, id).await?;
    Ok(ok(adapter(PLATFORM).render(&resource, fields.as_deref())))
}

async fn update_node(
    State(state): State<AppState>,
    Path((_version, node)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    respond(PLATFORM, update(&state, &node, &headers, query.as_deref(), &body).await)
}

async fn update(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, query).await?;
    let patch = parameters(headers, query, body)?;
    let existing = state.service.find_any(meta::LOOKUP_ORDER, id).await?;
    state.service.update(existing.resource_type, None, id, patch).await?;
    Ok(ok(json!({ "success": true })))
}

async fn delete_node(
    State(state): State<AppState>,
    Path((_version, node)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    respond(PLATFORM, delete(&state, &node, &headers, query.as_deref()).await)
}

async fn delete(state: &AppState, id: &str, headers: &HeaderMap, query: Option<&str>) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, query).await?;
    let existing = state.service.find_any(meta::LOOKUP_ORDER, id).await?;
    state.service.delete(existing.resource_type, None, id).await?;
    Ok(ok(json!({ "success": true })))
}
