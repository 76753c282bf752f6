//! Internal error taxonomy shared by every platform.
//!
//! Errors never leave the request boundary as-is: each platform adapter turns
//! an [`ApiError`] into its own envelope through
//! [`crate::platform::PlatformAdapter::error_envelope`], and the OAuth
//! endpoints use [`ApiError::oauth_response`].

use std::fmt;

use serde_json::{Value, json};
use tracing::warn;

use crate::resource::types::ResourceType;

/// The rule a payload field broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Field is absent, null or an empty string.
    Required,
    /// Field is present but empty (string, array or object).
    NonEmpty,
    /// Value is not part of the allowed vocabulary.
    OneOf(&'static [&'static str]),
    /// Value must be a number (or numeric string) greater than zero.
    Positive,
    /// Array contains an element outside the allowed vocabulary.
    Elements(&'static [&'static str]),
    /// Field cannot change once the resource exists.
    Immutable,
    /// Referenced parent does not exist in the same scope.
    Reference(ResourceType),
    /// Value does not have the expected shape.
    Format(&'static str),
    /// Resource is not in a state that allows the operation.
    Precondition(&'static str),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Required => write!(f, "is required"),
            Constraint::NonEmpty => write!(f, "must not be empty"),
            Constraint::OneOf(allowed) => write!(f, "must be one of {}", allowed.join(", ")),
            Constraint::Positive => write!(f, "must be greater than zero"),
            Constraint::Elements(allowed) => {
                write!(f, "must only contain values from {}", allowed.join(", "))
            }
            Constraint::Immutable => write!(f, "cannot be changed after creation"),
            Constraint::Reference(target) => write!(f, "must reference an existing {}", target.name()),
            Constraint::Format(expected) => write!(f, "must be a valid {}", expected),
            Constraint::Precondition(state) => write!(f, "requires the resource to be {}", state),
        }
    }
}

/// A single validation failure. Only the first one found is ever reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {constraint}")]
pub struct ValidationError {
    /// Dotted path of the offending field, in the platform's own naming.
    pub field: String,
    pub constraint: Constraint,
    /// Machine readable code in the platform's vocabulary.
    pub code: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: Constraint, code: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            constraint,
            code: code.into(),
        }
    }

    /// Human readable message, e.g. `name is required`.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Why a bearer credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential header (or query parameter) at all.
    Missing,
    /// Header present but not in the expected `<scheme> <token>` form.
    MalformedScheme,
    /// Scheme present, token empty.
    Empty,
    /// Token does not match the platform's configured token.
    Invalid,
    /// A companion header the platform requires is absent.
    MissingHeader(&'static str),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Missing => write!(f, "missing access token"),
            AuthFailure::MalformedScheme => write!(f, "malformed authorization header"),
            AuthFailure::Empty => write!(f, "empty access token"),
            AuthFailure::Invalid => write!(f, "invalid access token"),
            AuthFailure::MissingHeader(name) => write!(f, "missing required header {}", name),
        }
    }
}

/// Every failure the simulator can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    #[error("{} {id} not found", .resource_type.name())]
    NotFound { resource_type: ResourceType, id: String },
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: AuthFailure },
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },
    #[error("invalid grant: {reason}")]
    InvalidGrant { reason: String },
    #[error("unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },
    #[error("unsupported response type: {response_type}")]
    UnsupportedResponseType { response_type: String },
    #[error("client authentication failed")]
    InvalidClient,
    #[error("scope must include {required}")]
    InvalidScope { required: String },
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("too many requests")]
    RateLimited,
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used by the envelope mappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthenticated,
    Unauthorized,
    RateLimited,
    Internal,
}

impl ApiError {
    pub fn validation(field: impl Into<String>, constraint: Constraint, code: impl Into<String>) -> Self {
        ApiError::Validation(ValidationError::new(field, constraint, code))
    }

    pub fn not_found(resource_type: ResourceType, id: impl Into<String>) -> Self {
        ApiError::NotFound { resource_type, id: id.into() }
    }

    pub fn unauthenticated(reason: AuthFailure) -> Self {
        ApiError::Unauthenticated { reason }
    }

    pub fn invalid_grant(reason: impl Into<String>) -> Self {
        ApiError::InvalidGrant { reason: reason.into() }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        ApiError::InvalidRequest { reason: reason.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal { message: message.into() }
    }

    /// Maps the error onto the resource-API classes.
    ///
    /// OAuth-only variants fold into the nearest class: grant and request
    /// problems are validation failures, client failures are authentication
    /// failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidGrant { .. }
            | ApiError::UnsupportedGrantType { .. }
            | ApiError::UnsupportedResponseType { .. }
            | ApiError::InvalidScope { .. }
            | ApiError::InvalidRequest { .. } => ErrorKind::Validation,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Unauthenticated { .. } | ApiError::InvalidClient => ErrorKind::Unauthenticated,
            ApiError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ApiError::RateLimited => ErrorKind::RateLimited,
            ApiError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Default HTTP status for the error class.
    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Unauthorized => 403,
            ErrorKind::RateLimited => 429,
            ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show to a client. Internal details are never echoed.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal { .. } => "An unexpected error has occurred. Please retry your request later.".to_string(),
            ApiError::Validation(violation) => violation.message(),
            other => other.to_string(),
        }
    }

    /// RFC 6749 `{error, error_description}` body used by the authorize and
    /// token endpoints.
    pub fn oauth_response(&self) -> ErrorResponse {
        let (status, code) = match self {
            ApiError::InvalidClient => (401, "invalid_client"),
            ApiError::InvalidGrant { .. } => (400, "invalid_grant"),
            ApiError::UnsupportedGrantType { .. } => (400, "unsupported_grant_type"),
            ApiError::UnsupportedResponseType { .. } => (400, "unsupported_response_type"),
            ApiError::InvalidScope { .. } => (400, "invalid_scope"),
            ApiError::InvalidRequest { .. } | ApiError::Validation(_) => (400, "invalid_request"),
            ApiError::Unauthenticated { .. } => (401, "invalid_token"),
            ApiError::Unauthorized { .. } => (403, "unauthorized_client"),
            ApiError::NotFound { .. } => (404, "not_found"),
            ApiError::RateLimited => (429, "rate_limited"),
            ApiError::Internal { .. } => (500, "server_error"),
        };
        warn!(error = ?self, error_code = code, http_status = status, "OAuth error occurred");
        ErrorResponse::new(
            status,
            json!({ "error": code, "error_description": self.public_message() }),
        )
    }
}

/// A fully shaped error: status plus platform specific JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub body: Value,
}

impl ErrorResponse {
    pub fn new(status: u16, body: Value) -> Self {
        ErrorResponse { status, body }
    }
}

/// Failure inside a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("key already exists: {0}")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::internal("db connection dropped");
        assert_eq!(err.status(), 500);
        assert!(!err.public_message().contains("db connection"));
    }

    #[test]
    fn oauth_body_uses_rfc_vocabulary() {
        let resp = ApiError::invalid_grant("code already used").oauth_response();
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "invalid_grant");
        assert_eq!(resp.body["error_description"], "invalid grant: code already used");

        let resp = ApiError::InvalidClient.oauth_response();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body["error"], "invalid_client");
    }

    #[test]
    fn validation_message_names_field_and_rule() {
        let err = ValidationError::new("objective", Constraint::OneOf(&["A", "B"]), "100");
        assert_eq!(err.message(), "objective must be one of A, B");
    }
}
