//! Error taxonomy (spec §7) shared by every repository, service, and route.
//!
//! Routes never construct ad-hoc JSON errors: everything returned from a
//! handler funnels through [`ApiError`] and its [`axum::response::IntoResponse`]
//! impl, which logs with the correlation id and selects the HTTP status.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of failure, independent of its human-readable message.
///
/// Kinds map 1:1 to the table in spec §7. Ordering here is significant only
/// for `Debug`/`Display`; it is not used for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    External,
    Timeout,
    Database,
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to.
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::External => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Database | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A stable machine-readable code, distinct from the HTTP status, so
    /// clients can branch on it even if the status mapping ever changes.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::External => "external_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Database => "database_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// The error type every repository, service, and handler in this backend
/// returns. Constructed via the `ApiError::<kind>` helpers below, never
/// directly via struct literal outside this crate.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Populated by the route framework's central handler, not by callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    #[must_use]
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, message)
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// The stable JSON envelope returned by every error response:
/// `{error, code, details?, correlationId}`.
#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: &'a Option<Value>,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    correlation_id: &'a Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status_code();

        // Database/Internal/External kinds are operationally interesting;
        // Validation/NotFound/Forbidden are caller mistakes, logged at a
        // lower level to avoid drowning real incidents in noise.
        match self.kind {
            ErrorKind::Database | ErrorKind::Internal | ErrorKind::External => {
                tracing::error!(
                    kind = self.kind.code(),
                    correlation_id = self.correlation_id.as_deref().unwrap_or(""),
                    "{}",
                    self.message
                );
            }
            _ => {
                tracing::warn!(
                    kind = self.kind.code(),
                    correlation_id = self.correlation_id.as_deref().unwrap_or(""),
                    "{}",
                    self.message
                );
            }
        }

        let body = ErrorEnvelope {
            error: &self.message,
            code: self.kind.code(),
            details: &self.details,
            correlation_id: &self.correlation_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience alias used throughout handlers: `ApiResult<Json<T>>`.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(ErrorKind::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorKind::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorKind::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ErrorKind::External.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorKind::Timeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ErrorKind::Database.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorKind::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn builder_sets_fields() {
        let err = ApiError::not_found("widget missing").with_correlation_id("corr-1");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.correlation_id.as_deref(), Some("corr-1"));
    }
}
