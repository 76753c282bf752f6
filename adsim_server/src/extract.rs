//! Request decoding shared by every platform router.

use adsim_core::error::AuthFailure;
use adsim_core::platform::Platform;
use adsim_core::{ApiError, ClientContext, PresentedCredential};
use axum::http::{HeaderMap, header};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::state::AppState;

/// Query string pairs as a JSON object of strings. Repeated keys keep the
/// last value.
pub fn query_map(raw: Option<&str>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            map.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    map
}

/// Decodes a request body as a JSON object, or as form fields when the
/// content type says so. Form values holding JSON objects or arrays are
/// expanded, the way the Graph API reads `targeting={...}`.
pub fn body_map(headers: &HeaderMap, body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    if is_form(headers) {
        let mut map = Map::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            map.insert(key.into_owned(), form_value(&value));
        }
        return Ok(map);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::invalid_request("request body must be a JSON object")),
        Err(err) => Err(ApiError::invalid_request(format!("request body is not valid JSON: {}", err))),
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn form_value(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            return parsed;
        }
    }
    Value::String(raw.to_string())
}

/// Deserializes a decoded parameter map into a typed request.
pub fn decode<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(params)).map_err(|err| ApiError::invalid_request(err.to_string()))
}

/// A string parameter, ignoring blanks.
pub fn param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// A string or numeric parameter as text, ignoring blanks.
pub fn text(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key) {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// A numeric parameter sent either as a JSON number or a string.
pub fn usize_param(params: &Map<String, Value>, key: &str) -> Result<Option<usize>, ApiError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ApiError::invalid_request(format!("{} must be a non-negative integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ApiError::invalid_request(format!("{} must be a non-negative integer", key))),
        Some(_) => Err(ApiError::invalid_request(format!("{} must be a non-negative integer", key))),
    }
}

/// Comma separated field list (`fields=id,name`).
pub fn field_list(raw: Option<&str>) -> Option<Vec<String>> {
    let fields: Vec<String> = raw?
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    (!fields.is_empty()).then_some(fields)
}

pub fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `true` when the caller's `Accept` header asks for JSON.
pub fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.split(',').any(|t| t.trim().starts_with("application/json")))
}

/// Authenticates a resource request and charges it against the rate limit.
pub async fn authenticate(
    state: &AppState,
    platform: Platform,
    headers: &HeaderMap,
    raw_query: Option<&str>,
) -> Result<ClientContext, ApiError> {
    let profile = platform.profile();
    let query = profile.query_token_param.and_then(|name| {
        raw_query.and_then(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
    });
    let presented = PresentedCredential {
        header: header(headers, profile.auth_header),
        query: query.as_deref(),
    };
    let context = state.engine.authenticate(platform, presented).await?;

    if let Some(limiter) = &state.limiter {
        let key = format!("{}:{}", platform, context.client_id);
        if !limiter.consume(&key).await? {
            debug!(key = %key, "rate limit exhausted");
            return Err(ApiError::RateLimited);
        }
    }
    Ok(context)
}

/// Companion header a platform insists on next to the token.
pub fn require_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ApiError> {
    header(headers, name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::unauthenticated(AuthFailure::MissingHeader(name)))
}
