//! LinkedIn Marketing API (rest.li): ad account scoped campaign groups,
//! campaigns and creatives, gated on the `Linkedin-Version` header.

use adsim_core::platform::{adapter, linkedin};
use adsim_core::resource::repository::ListQuery;
use adsim_core::{ApiError, PageRequest, Platform, ResourceType};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::Value;

use crate::extract::{authenticate, body_map, field_list, header, param, query_map, usize_param};
use crate::response::{envelope, ok, respond, respond_oauth};
use crate::state::AppState;

const PLATFORM: Platform = Platform::LinkedIn;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/v2/authorization", get(authorize))
        .route("/oauth/v2/accessToken", post(token))
        .route("/rest/adAccounts/:account/:collection", get(list_collection).post(create_in_collection))
        .route(
            "/rest/adAccounts/:account/:collection/:id",
            get(read_entity).post(update_entity).delete(delete_entity),
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

/// Rejection for a missing or unserved `Linkedin-Version`.
fn version_gate(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    linkedin::version_error(header(headers, "linkedin-version"), &state.linkedin_version).map(envelope)
}

fn collection_type(collection: &str) -> Result<ResourceType, ApiError> {
    linkedin::from_collection(collection)
        .ok_or_else(|| ApiError::invalid_request(format!("unknown collection: {}", collection)))
}

/// Creatives are keyed by URN; accept their numeric id too.
fn entity_id(resource_type: ResourceType, id: &str) -> String {
    match resource_type {
        ResourceType::LinkedInCreative => linkedin::urn(resource_type, id),
        _ => id.to_string(),
    }
}

async fn create_in_collection(
    State(state): State<AppState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = version_gate(&state, &headers) {
        return rejection;
    }
    respond(PLATFORM, create(&state, &account, &collection, &headers, &body).await)
}

async fn create(
    state: &AppState,
    account: &str,
    collection: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let fields = body_map(headers, body)?;
    let created = state.service.create(resource_type, account, fields).await?;
    let location = format!("/linkedin/rest/adAccounts/{}/{}/{}", account, collection, created.id);
    Ok((
        StatusCode::CREATED,
        [("x-restli-id", created.id.clone()), (LOCATION.as_str(), location)],
    )
        .into_response())
}

async fn list_collection(
    State(state): State<AppState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    if let Some(rejection) = version_gate(&state, &headers) {
        return rejection;
    }
    respond(PLATFORM, list(&state, &account, &collection, &headers, query.as_deref()).await)
}

async fn list(
    state: &AppState,
    account: &str,
    collection: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let params = query_map(query);
    if let Some(finder) = param(&params, "q") {
        if finder != "search" {
            return Err(ApiError::invalid_request(format!("unsupported finder: {}", finder)));
        }
    }

    let page = PageRequest::from_start_index(
        PLATFORM.profile(),
        usize_param(&params, "start")?,
        usize_param(&params, "count")?,
    );
    let fields = field_list(param(&params, "fields"));
    let mut list_query = ListQuery::new(page).project(fields.clone());
    if let Some(search) = param(&params, "search") {
        for filter in linkedin::parse_search(search)? {
            list_query = list_query.filter(filter);
        }
    }

    let page = state.service.list(resource_type, account, &list_query).await?;
    let elements = page
        .items
        .iter()
        .map(|resource| adapter(PLATFORM).render(resource, fields.as_deref()))
        .collect();
    let count = page.page_size;
    Ok(ok(linkedin::list_envelope(elements, &page, |start| {
        format!("/linkedin/rest/adAccounts/{}/{}?q=search&start={}&count={}", account, collection, start, count)
    })))
}

async fn read_entity(
    State(state): State<AppState>,
    Path((account, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    if let Some(rejection) = version_gate(&state, &headers) {
        return rejection;
    }
    respond(PLATFORM, read(&state, &account, &collection, &id, &headers, query.as_deref()).await)
}

async fn read(
    state: &AppState,
    account: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    let params = query_map(query);
    let fields = field_list(param(&params, "fields"));
    let resource = state
        .service
        .get(resource_type, Some(account), &entity_id(resource_type, id))
        .await?;
    Ok(ok(adapter(PLATFORM).render(&resource, fields.as_deref())))
}

async fn update_entity(
    State(state): State<AppState>,
    Path((account, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(rejection) = version_gate(&state, &headers) {
        return rejection;
    }
    respond(PLATFORM, update(&state, &account, &collection, &id, &headers, &body).await)
}

/// Only `X-RestLi-Method: PARTIAL_UPDATE` is served on the entity POST.
async fn update(
    state: &AppState,
    account: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    match header(headers, "x-restli-method") {
        Some(method) if method.eq_ignore_ascii_case("PARTIAL_UPDATE") => {}
        _ => return Err(ApiError::invalid_request("X-RestLi-Method must be PARTIAL_UPDATE")),
    }
    let body = Value::Object(body_map(headers, body)?);
    let patch = linkedin::partial_update_patch(&body)?;
    state
        .service
        .update(resource_type, Some(account), &entity_id(resource_type, id), patch)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn delete_entity(
    State(state): State<AppState>,
    Path((account, collection, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = version_gate(&state, &headers) {
        return rejection;
    }
    respond(PLATFORM, delete(&state, &account, &collection, &id, &headers).await)
}

async fn delete(
    state: &AppState,
    account: &str,
    collection: &str,
    id: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = collection_type(collection)?;
    state
        .service
        .delete(resource_type, Some(account), &entity_id(resource_type, id))
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
