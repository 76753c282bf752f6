//! Google Ads REST: `{collection}:mutate` batches and `googleAds:search`.

use adsim_core::platform::{adapter, google_ads};
use adsim_core::resource::repository::ListQuery;
use adsim_core::{ApiError, Page, PageRequest, Platform, Resource, ResourceType};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::extract::{authenticate, body_map, param, query_map, require_header, usize_param};
use crate::response::{envelope, ok, respond, respond_oauth};
use crate::state::AppState;

const PLATFORM: Platform = Platform::GoogleAds;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/o/oauth2/auth", get(authorize))
        .route("/token", post(token))
        .route("/:version/customers/:customer/:operation", post(operation))
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

async fn operation(
    State(state): State<AppState>,
    Path((_version, customer, operation)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(PLATFORM, dispatch(&state, &customer, &operation, &headers, &body).await)
}

async fn dispatch(
    state: &AppState,
    customer: &str,
    operation: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    authenticate(state, PLATFORM, headers, None).await?;
    require_header(headers, "developer-token")?;
    let customer = google_ads::customer_scope(customer);
    let request = body_map(headers, body)?;

    match operation.split_once(':') {
        Some(("googleAds", "search")) => search(state, &customer, &request).await,
        Some(("googleAds", "searchStream")) => search_stream(state, &customer, &request).await,
        Some((collection, "mutate")) => {
            let resource_type = google_ads::from_collection(collection)
                .ok_or_else(|| ApiError::invalid_request(format!("unknown resource collection: {}", collection)))?;
            mutate(state, &customer, resource_type, &request).await
        }
        _ => Err(ApiError::invalid_request(format!("unknown method: {}", operation))),
    }
}

/// Runs the operations in order. The first failure stops the batch and is
/// reported with the index of the offending operation; earlier operations
/// stay applied.
async fn mutate(
    state: &AppState,
    customer: &str,
    resource_type: ResourceType,
    request: &Map<String, Value>,
) -> Result<Response, ApiError> {
    let operations = request
        .get("operations")
        .and_then(Value::as_array)
        .filter(|ops| !ops.is_empty())
        .ok_or_else(|| ApiError::invalid_request("operations must be a non-empty array"))?;

    let mut results = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        let (verb, outcome) = apply(state, customer, resource_type, operation).await;
        match outcome {
            Ok(resource_name) => results.push(json!({ "resourceName": resource_name })),
            Err(err) => {
                let response = google_ads::mutate_failure(&err, index, verb);
                warn!(error = ?err, index, http_status = response.status, "mutate operation failed");
                return Ok(envelope(response));
            }
        }
    }
    debug!(count = results.len(), resource_type = %resource_type, "mutate applied");
    Ok(ok(json!({ "results": results })))
}

async fn apply(
    state: &AppState,
    customer: &str,
    resource_type: ResourceType,
    operation: &Value,
) -> (&'static str, Result<String, ApiError>) {
    if let Some(create) = operation.get("create") {
        ("create", create_one(state, customer, resource_type, create).await)
    } else if let Some(update) = operation.get("update") {
        let mask = operation.get("updateMask").and_then(Value::as_str);
        ("update", update_one(state, customer, resource_type, update, mask).await)
    } else if let Some(remove) = operation.get("remove") {
        ("remove", remove_one(state, customer, resource_type, remove).await)
    } else {
        ("operation", Err(ApiError::invalid_request("operation must contain create, update or remove")))
    }
}

fn object(value: &Value, name: &str) -> Result<Map<String, Value>, ApiError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::invalid_request(format!("{} must be an object", name)))
}

async fn create_one(
    state: &AppState,
    customer: &str,
    resource_type: ResourceType,
    create: &Value,
) -> Result<String, ApiError> {
    let fields = object(create, "create")?;
    let created = state.service.create(resource_type, customer, fields).await?;
    Ok(google_ads::resource_name(&created))
}

/// Resolves a resource name to an id of the expected type in this customer.
fn target_id<'a>(customer: &str, resource_type: ResourceType, name: &'a str) -> Result<&'a str, ApiError> {
    match google_ads::parse_resource_name(name) {
        Some((owner, kind, id)) if kind == resource_type && owner == customer => Ok(id),
        Some((_, kind, id)) if kind == resource_type => Err(ApiError::not_found(resource_type, id)),
        _ => Err(ApiError::invalid_request(format!("malformed resource name: {}", name))),
    }
}

async fn update_one(
    state: &AppState,
    customer: &str,
    resource_type: ResourceType,
    update: &Value,
    mask: Option<&str>,
) -> Result<String, ApiError> {
    let mut fields = object(update, "update")?;
    let name = fields
        .remove("resourceName")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| ApiError::invalid_request("update.resourceName is required"))?;
    let id = target_id(customer, resource_type, &name)?;

    let patch = match mask.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mask) => {
            let mut patch = Map::new();
            for path in mask.split(',') {
                let top = path.trim().split('.').next().unwrap_or_default();
                if !top.is_empty() {
                    patch.insert(top.to_string(), fields.get(top).cloned().unwrap_or(Value::Null));
                }
            }
            patch
        }
        None => fields,
    };
    let updated = state.service.update(resource_type, Some(customer), id, patch).await?;
    Ok(google_ads::resource_name(&updated))
}

async fn remove_one(
    state: &AppState,
    customer: &str,
    resource_type: ResourceType,
    remove: &Value,
) -> Result<String, ApiError> {
    let name = remove
        .as_str()
        .ok_or_else(|| ApiError::invalid_request("remove must be a resource name"))?;
    let id = target_id(customer, resource_type, name)?;
    let removed = state.service.delete(resource_type, Some(customer), id).await?;
    Ok(google_ads::resource_name(&removed))
}

/// Runs a GAQL statement and renders the requested window.
async fn run_query(
    state: &AppState,
    customer: &str,
    request: &Map<String, Value>,
    page: Option<PageRequest>,
) -> Result<(Vec<Value>, Page<Resource>), ApiError> {
    let statement = param(request, "query").ok_or_else(|| ApiError::invalid_request("query is required"))?;
    let query = google_ads::parse_query(statement)?;
    let page = match page {
        Some(page) => page,
        None => PageRequest::from_cursor(
            PLATFORM.profile(),
            param(request, "pageToken"),
            usize_param(request, "pageSize")?,
        )?,
    };

    let top_level: Vec<String> = query
        .fields
        .iter()
        .filter_map(|f| f.split('.').next())
        .map(str::to_string)
        .collect();
    let mut list_query = ListQuery::new(page.limited(query.limit)).project(Some(top_level.clone()));
    for filter in query.filters {
        list_query = list_query.filter(filter);
    }

    let mut page = state.service.list(query.resource_type, customer, &list_query).await?;
    if query.limit.is_some() {
        page.next_cursor = None;
    }
    let rows = page
        .items
        .iter()
        .map(|resource| {
            let rendered = adapter(PLATFORM).render(resource, Some(top_level.as_slice()));
            google_ads::search_row(query.resource_type, rendered)
        })
        .collect();
    Ok((rows, page))
}

async fn search(state: &AppState, customer: &str, request: &Map<String, Value>) -> Result<Response, ApiError> {
    let (rows, page) = run_query(state, customer, request, None).await?;
    let mut body = Map::new();
    body.insert("results".to_string(), Value::Array(rows));
    if let Some(token) = &page.next_cursor {
        body.insert("nextPageToken".to_string(), json!(token));
    }
    body.insert("totalResultsCount".to_string(), json!(page.total.to_string()));
    Ok(ok(Value::Object(body)))
}

/// Every matching row in a single batch.
async fn search_stream(state: &AppState, customer: &str, request: &Map<String, Value>) -> Result<Response, ApiError> {
    let profile = PLATFORM.profile();
    let everything = PageRequest { offset: 0, page_size: profile.max_page_size };
    let (rows, _) = run_query(state, customer, request, Some(everything)).await?;
    Ok(ok(json!([{ "results": rows }])))
}
