//! Turning core results into HTTP responses.

use adsim_core::error::ErrorResponse;
use adsim_core::platform::adapter;
use adsim_core::{ApiError, Platform};
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::warn;

/// A JSON body with an explicit status.
pub fn json(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

pub fn ok(body: Value) -> Response {
    json(200, body)
}

pub fn envelope(response: ErrorResponse) -> Response {
    json(response.status, response.body)
}

/// Shapes a failed resource request in the platform's envelope.
pub fn failure(platform: Platform, err: &ApiError) -> Response {
    let response = adapter(platform).error_envelope(err);
    warn!(
        error = ?err,
        platform = %platform,
        http_status = response.status,
        "request failed"
    );
    envelope(response)
}

/// Unwraps a handler result, mapping errors through the platform envelope.
pub fn respond(platform: Platform, result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(|err| failure(platform, &err))
}

/// Unwraps a token endpoint result in the RFC 6749 error format.
pub fn respond_oauth(result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(|err| envelope(err.oauth_response()))
}

/// `302 Found` to `location`.
pub fn found(location: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| ApiError::invalid_request("redirect_uri is not a valid header value"))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, value)]).into_response())
}
