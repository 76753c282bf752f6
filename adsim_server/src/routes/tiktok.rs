//! TikTok Business API v1.3. Every answer, including failures other than
//! internal ones, is an HTTP 200 carrying the `{code, message, data}`
//! envelope.

use adsim_core::platform::{adapter, tiktok};
use adsim_core::resource::repository::ListQuery;
use adsim_core::{ApiError, AuthorizeRequest, Constraint, PageRequest, Platform, ResourceType, TokenRequest};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::{Map, Value, json};

use crate::extract::{authenticate, body_map, param, query_map, text, usize_param, wants_json};
use crate::response::{ok, respond};
use crate::state::AppState;

const PLATFORM: Platform = Platform::TikTok;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portal/auth", get(portal_auth))
        .route("/open_api/v1.3/oauth2/access_token/", post(access_token))
        .route("/open_api/v1.3/oauth2/refresh_token/", post(refresh_token))
        .route("/open_api/v1.3/:kind/create/", post(create_entity))
        .route("/open_api/v1.3/:kind/update/", post(update_entity))
        .route("/open_api/v1.3/:kind/status/update/", post(update_status))
        .route("/open_api/v1.3/:kind/get/", get(list_entities))
}

fn kind_type(kind: &str) -> Result<ResourceType, ApiError> {
    tiktok::from_segment(kind).ok_or_else(|| ApiError::invalid_request(format!("unknown object type: {}", kind)))
}

fn invalid(field: &str, constraint: Constraint) -> ApiError {
    ApiError::validation(field, constraint, tiktok::INVALID_PARAMS.to_string())
}

fn advertiser(params: &Map<String, Value>) -> Result<String, ApiError> {
    text(params, "advertiser_id").ok_or_else(|| invalid("advertiser_id", Constraint::Required))
}

/// A parameter that may arrive as JSON text in a query string.
fn json_param(params: &Map<String, Value>, key: &str) -> Result<Value, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(Value::Null),
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).map_err(|_| invalid(key, Constraint::Format("JSON value")))
        }
        Some(other) => Ok(other.clone()),
    }
}

async fn portal_auth(State(state): State<AppState>, headers: HeaderMap, RawQuery(query): RawQuery) -> Response {
    respond(PLATFORM, authorize(&state, &headers, query.as_deref()).await)
}

/// The portal names the client `app_id` and hands the code back twice,
/// as `auth_code` and as `code`.
async fn authorize(state: &AppState, headers: &HeaderMap, query: Option<&str>) -> Result<Response, ApiError> {
    let params = query_map(query);
    let request = AuthorizeRequest {
        client_id: param(&params, "app_id").or(param(&params, "client_id")).unwrap_or_default().to_string(),
        redirect_uri: param(&params, "redirect_uri").unwrap_or_default().to_string(),
        response_type: param(&params, "response_type").unwrap_or("code").to_string(),
        scope: param(&params, "scope").map(str::to_string),
        state: param(&params, "state").map(str::to_string),
    };
    let granted = state.engine.authorize(PLATFORM, &request).await?;
    if wants_json(headers) {
        return Ok(ok(tiktok::ok(json!({
            "auth_code": granted.code,
            "code": granted.code,
            "state": granted.state,
        }))));
    }
    let mut pairs = vec![("auth_code", granted.code.as_str()), ("code", granted.code.as_str())];
    if let Some(st) = granted.state.as_deref() {
        pairs.push(("state", st));
    }
    super::redirect_with(&request.redirect_uri, &pairs)
}

async fn access_token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    respond(PLATFORM, exchange(&state, &headers, &body, "auth_code").await)
}

async fn refresh_token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    respond(PLATFORM, exchange(&state, &headers, &body, "refresh_token").await)
}

/// `credential` names the body field carrying the code or refresh token.
async fn exchange(state: &AppState, headers: &HeaderMap, body: &[u8], credential: &str) -> Result<Response, ApiError> {
    let params = body_map(headers, body)?;
    let presented = param(&params, credential).map(str::to_string);
    let mut request = TokenRequest {
        client_id: param(&params, "app_id").unwrap_or_default().to_string(),
        client_secret: param(&params, "secret").map(str::to_string),
        ..TokenRequest::default()
    };
    if credential == "auth_code" {
        request.grant_type = "authorization_code".to_string();
        request.code = presented;
    } else {
        request.grant_type = "refresh_token".to_string();
        request.refresh_token = presented;
    }

    let issued = state.engine.exchange(PLATFORM, &request).await?;
    Ok(ok(tiktok::ok(json!({
        "access_token": issued.access_token,
        "scope": issued.scope,
        "token_type": issued.token_type,
        "expires_in": issued.expires_in,
        "refresh_token": issued.refresh_token,
        "refresh_token_expires_in": issued.refresh_token_expires_in,
        "advertiser_ids": [],
    }))))
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
    let advertiser = advertiser(&fields)?;
    let created = state.service.create(resource_type, &advertiser, fields).await?;
    Ok(ok(tiktok::ok(adapter(PLATFORM).render(&created, None))))
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
    let advertiser = advertiser(&patch)?;
    let id_field = resource_type.id_field();
    let id = text(&patch, id_field).ok_or_else(|| invalid(id_field, Constraint::Required))?;
    let updated = state.service.update(resource_type, Some(&advertiser), &id, patch).await?;
    Ok(ok(tiktok::ok(adapter(PLATFORM).render(&updated, None))))
}

async fn update_status(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, set_status(&state, &kind, &headers, &body).await)
}

/// Batch status change. `DELETE` goes through the delete transition; the
/// batch stops at the first failing id.
async fn set_status(state: &AppState, kind: &str, headers: &HeaderMap, body: &[u8]) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let params = body_map(headers, body)?;
    let advertiser = advertiser(&params)?;

    let ids_field = tiktok::ids_field(resource_type);
    let ids: Vec<String> = params
        .get(&ids_field)
        .and_then(Value::as_array)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| invalid(&ids_field, Constraint::NonEmpty))?
        .iter()
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    let status = param(&params, "operation_status")
        .ok_or_else(|| invalid("operation_status", Constraint::Required))?;
    if !tiktok::OPERATION_STATUSES.contains(&status) {
        return Err(invalid("operation_status", Constraint::OneOf(tiktok::OPERATION_STATUSES)));
    }

    for id in &ids {
        if status == "DELETE" {
            state.service.delete(resource_type, Some(&advertiser), id).await?;
        } else {
            let mut patch = Map::new();
            patch.insert("operation_status".to_string(), json!(status));
            state.service.update(resource_type, Some(&advertiser), id, patch).await?;
        }
    }
    let mut data = Map::new();
    data.insert(ids_field, json!(ids));
    data.insert("status".to_string(), json!(status));
    Ok(ok(tiktok::ok(Value::Object(data))))
}

async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    respond(PLATFORM, list(&state, &kind, &headers, query.as_deref()).await)
}

async fn list(state: &AppState, kind: &str, headers: &HeaderMap, query: Option<&str>) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    let resource_type = kind_type(kind)?;
    let params = query_map(query);
    let advertiser = advertiser(&params)?;

    let page = PageRequest::from_page(
        PLATFORM.profile(),
        usize_param(&params, "page")?,
        usize_param(&params, "page_size")?,
    );
    let fields = match json_param(&params, "fields")? {
        Value::Null => None,
        Value::Array(names) => Some(names.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()),
        _ => return Err(invalid("fields", Constraint::Format("JSON array"))),
    };
    let mut list_query = ListQuery::new(page).project(fields.clone());
    for filter in tiktok::parse_filtering(&json_param(&params, "filtering")?)? {
        list_query = list_query.filter(filter);
    }

    let page = state.service.list(resource_type, &advertiser, &list_query).await?;
    let items = page
        .items
        .iter()
        .map(|resource| adapter(PLATFORM).render(resource, fields.as_deref()))
        .collect();
    Ok(ok(tiktok::ok(tiktok::list_data(items, &page))))
}
