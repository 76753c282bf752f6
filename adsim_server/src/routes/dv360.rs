//! Display & Video 360 v3: advertiser scoped campaigns, insertion orders
//! and line items.

use adsim_core::platform::{adapter, dv360};
use adsim_core::resource::repository::ListQuery;
use adsim_core::{ApiError, PageRequest, Platform, ResourceType};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::json;

use crate::extract::{authenticate, body_map, param, query_map, usize_param};
use crate::response::{ok, respond, respond_oauth};
use crate::state::AppState;

const PLATFORM: Platform = Platform::Dv360;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/o/oauth2/auth", get(authorize))
        .route("/token", post(token))
        .route("/v3/advertisers/:advertiser/:collection", get(list_collection).post(create_in_collection))
        .route(
            "/v3/advertisers/:advertiser/:collection/:id",
            get(read_entity).patch(patch_entity).delete(delete_entity),
        )
}

async fn authorize(State(state): State<AppState>, headers: HeaderMap, RawQuery(query): RawQuery) -> Response {
    respond_oauth(super::authorize(&state, PLATFORM, &headers, query_map(query.as_deref())).await)
}

async fn token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    respond_oauth(exchange(&state, &headers, &body).await)
}

async fn exchange(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    let params = body_map(headers, body)?;
    super::token(state, PLATFORM, headers, params).await
}

fn collection_type(collection: &str) -> Result<ResourceType, ApiError> {
    dv360::from_collection(collection)
        .ok_or_else(|| ApiError::invalid_request(format!("unknown collection: {}", collection)))
}

async fn create_in_collection(
    State(state): State<AppState>,
    Path((advertiser, collection)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, create(&state, &advertiser, &collection, &headers, &body).await)
}

async fn create(
    state: &AppState,
    advertiser: &str,
    collection: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let fields = body_map(headers, body)?;
    let created = state.service.create(resource_type, advertiser, fields).await?;
    Ok(ok(adapter(PLATFORM).render(&created, None)))
}

async fn list_collection(
    State(state): State<AppState>,
    Path((advertiser, collection)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    respond(PLATFORM, list(&state, &advertiser, &collection, &headers, query.as_deref()).await)
}

async fn list(
    state: &AppState,
    advertiser: &str,
    collection: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let params = query_map(query);
    let page = PageRequest::from_cursor(
        PLATFORM.profile(),
        param(&params, "pageToken"),
        usize_param(&params, "pageSize")?,
    )?;
    let mut list_query = ListQuery::new(page);
    if let Some(filter) = param(&params, "filter") {
        for term in dv360::parse_filter(filter)? {
            list_query = list_query.filter(term);
        }
    }

    let page = state.service.list(resource_type, advertiser, &list_query).await?;
    let items = page
        .items
        .iter()
        .map(|resource| adapter(PLATFORM).render(resource, None))
        .collect();
    Ok(ok(dv360::list_envelope(resource_type, items, &page)))
}

async fn read_entity(
    State(state): State<AppState>,
    Path((advertiser, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    respond(PLATFORM, read(&state, &advertiser, &collection, &id, &headers).await)
}

async fn read(
    state: &AppState,
    advertiser: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let resource = state.service.get(resource_type, Some(advertiser), id).await?;
    Ok(ok(adapter(PLATFORM).render(&resource, None)))
}

async fn patch_entity(
    State(state): State<AppState>,
    Path((advertiser, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    respond(
        PLATFORM,
        patch(&state, &advertiser, &collection, &id, &headers, query.as_deref(), &body).await,
    )
}

/// Only the fields named by `updateMask` are touched.
async fn patch(
    state: &AppState,
    advertiser: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let params = query_map(query);
    let body = body_map(headers, body)?;
    let patch = dv360::masked_patch(&body, param(&params, "updateMask"))?;
    let updated = state.service.update(resource_type, Some(advertiser), id, patch).await?;
    Ok(ok(adapter(PLATFORM).render(&updated, None)))
}

async fn delete_entity(
    State(state): State<AppState>,
    Path((advertiser, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    respond(PLATFORM, delete(&state, &advertiser, &collection, &id, &headers).await)
}

async fn delete(
    state: &AppState,
    advertiser: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    state.service.delete(resource_type, Some(advertiser), id).await?;
    Ok(ok(json!({})))
}
