//! Router assembly. Each platform lives under its own prefix and only talks
//! to the core through [`AppState`].

use adsim_core::{ApiError, AuthorizeRequest, Platform, TokenRequest};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::extract::{decode, param, wants_json};
use crate::response::{found, ok};
use crate::state::AppState;

pub mod dv360;
pub mod google_ads;
pub mod linkedin;
pub mod meta;
pub mod tiktok;
pub mod trade_desk;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    platforms: Vec<&'static str>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        platforms: Platform::ALL.iter().map(Platform::as_str).collect(),
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/meta", meta::router())
        .nest("/google-ads", google_ads::router())
        .nest("/linkedin", linkedin::router())
        .nest("/tiktok", tiktok::router())
        .nest("/ttd/v3", trade_desk::router())
        .nest("/dv360", dv360::router())
        .with_state(state)
}

/// Appends query pairs to a client supplied redirect URI.
pub(crate) fn redirect_with(redirect_uri: &str, pairs: &[(&str, &str)]) -> Result<Response, ApiError> {
    let mut url = Url::parse(redirect_uri).map_err(|_| ApiError::invalid_request("redirect_uri is not a valid URL"))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    found(url.as_str())
}

/// RFC 6749 authorization endpoint: redirects back with `code` and `state`,
/// or answers `{code, state?}` when the caller accepts JSON.
pub(crate) async fn authorize(
    state: &AppState,
    platform: Platform,
    headers: &HeaderMap,
    params: Map<String, Value>,
) -> Result<Response, ApiError> {
    let request: AuthorizeRequest = decode(params)?;
    let granted = state.engine.authorize(platform, &request).await?;
    if wants_json(headers) {
        let body = serde_json::to_value(&granted).map_err(|err| ApiError::internal(err.to_string()))?;
        return Ok(ok(body));
    }
    let mut pairs = vec![("code", granted.code.as_str())];
    if let Some(st) = granted.state.as_deref() {
        pairs.push(("state", st));
    }
    redirect_with(&request.redirect_uri, &pairs)
}

/// RFC 6749 token endpoint. Client credentials may also arrive through
/// HTTP basic authentication.
pub(crate) async fn token(
    state: &AppState,
    platform: Platform,
    headers: &HeaderMap,
    mut params: Map<String, Value>,
) -> Result<Response, ApiError> {
    if param(&params, "client_id").is_none() {
        if let Some((id, secret)) = basic_credentials(headers) {
            params.insert("client_id".to_string(), Value::String(id));
            params.insert("client_secret".to_string(), Value::String(secret));
        }
    }
    let request: TokenRequest = decode(params)?;
    let issued = state.engine.exchange(platform, &request).await?;
    let body = serde_json::to_value(issued).map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(ok(body))
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = crate::extract::header(headers, "authorization")?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let (id, secret) = std::str::from_utf8(&decoded).ok()?.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}
