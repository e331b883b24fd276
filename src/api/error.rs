//! HTTP error mapping
//!
//! Every failure leaving a handler goes through [`ApiError`], which logs it
//! once and renders `{"error": "<message>"}` with the matching status.

use crate::event_store::{StoreError, ValidationError};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    StoreUnavailable(StoreError),
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Client-facing message; store internals stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::StoreUnavailable(_) => "Event store unavailable".to_string(),
            ApiError::Unauthorized => "Unauthorized".to_string(),
        }
    }

    /// Log at the request boundary: client mistakes at warn, store failures at error.
    pub fn log(&self, route: &str) {
        match self {
            ApiError::Validation(msg) => log::warn!("⚠️  {} rejected: {}", route, msg),
            ApiError::Unauthorized => log::warn!("🔒 {} rejected: bad or missing credential", route),
            ApiError::StoreUnavailable(e) => log::error!("❌ {} failed: {}", route, e),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ApiError::StoreUnavailable(e) => write!(f, "Store unavailable: {}", e),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::StoreUnavailable(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::MissingField("user_id")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Timeout("acquire")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_details_not_exposed() {
        let err = ApiError::from(StoreError::Pool("database is locked at /srv/x.db".to_string()));
        assert_eq!(err.message(), "Event store unavailable");
        assert!(err.to_string().contains("/srv/x.db"));
    }
}
