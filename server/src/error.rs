//! Mapping from failures to HTTP responses.
//!
//! Bodies follow the shapes clients of the service already parse:
//! `{"detail": "..."}` for lookup failures, a list of field errors under
//! `detail` for validation, `{"error": "..."}` for rate limiting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use comic_core::{ApiError, BatchError, NOT_FOUND_MESSAGE};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::RateLimit;

/// One rejected input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn not_an_integer(loc: Vec<serde_json::Value>) -> Self {
        Self {
            loc,
            msg: "value is not a valid integer".to_string(),
            kind: "type_error.integer".to_string(),
        }
    }

    pub fn missing(loc: Vec<serde_json::Value>) -> Self {
        Self {
            loc,
            msg: "field required".to_string(),
            kind: "value_error.missing".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// A lookup failed; `id` is `None` for the current comic.
    #[error("{}", comic_detail(.id, .source))]
    Comic { id: Option<i64>, source: ApiError },

    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(RateLimit),

    #[error("internal error: {0}")]
    Internal(String),
}

fn comic_detail(id: &Option<i64>, source: &ApiError) -> String {
    match id {
        Some(id) => format!("For comic id={id}: {source}"),
        None => source.to_string(),
    }
}

impl AppError {
    pub fn comic(id: impl Into<i64>, source: ApiError) -> Self {
        AppError::Comic {
            id: Some(id.into()),
            source,
        }
    }

    /// An id no comic can have, answered the way the host answers it.
    pub fn no_such_comic(id: i64) -> Self {
        Self::comic(
            id,
            ApiError::NotFound {
                status: 404,
                message: NOT_FOUND_MESSAGE.to_string(),
            },
        )
    }

    pub fn current(source: ApiError) -> Self {
        AppError::Comic { id: None, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Comic { source, .. } => match source {
                // Echo the upstream status, as long as it is an error status.
                ApiError::NotFound { status, .. } => StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::NOT_FOUND),
                ApiError::FetchFailed(_)
                | ApiError::DeserializationError(_)
                | ApiError::ImageUnavailable { .. } => StatusCode::BAD_GATEWAY,
                ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BatchError> for AppError {
    fn from(err: BatchError) -> Self {
        AppError::Comic {
            id: err.id.map(i64::from),
            source: err.source,
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            log::error!("{message}");
        } else {
            log::info!("{message}");
        }
        let body = match self {
            AppError::Validation(errors) => json!({ "detail": errors }),
            AppError::RateLimited(_) => json!({ "error": message }),
            _ => json!({ "detail": message }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(status: u16) -> ApiError {
        ApiError::NotFound {
            status,
            message: "Item not found".to_string(),
        }
    }

    #[test]
    fn comic_detail_has_id_prefix() {
        let err = AppError::comic(10000, not_found(404));
        assert_eq!(err.to_string(), "For comic id=10000: Item not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn current_detail_has_no_prefix() {
        let err = AppError::current(not_found(404));
        assert_eq!(err.to_string(), "Item not found");
    }

    #[test]
    fn upstream_error_status_is_echoed() {
        assert_eq!(
            AppError::comic(1, not_found(503)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::comic(1, not_found(302)).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn transport_failures_are_bad_gateway() {
        let err = AppError::comic(1, ApiError::FetchFailed("refused".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn impossible_id_is_not_found() {
        let err = AppError::no_such_comic(-1);
        assert_eq!(err.to_string(), "For comic id=-1: Item not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn batch_error_keeps_its_id() {
        let err: AppError = BatchError {
            id: Some(7),
            source: not_found(404),
        }
        .into();
        assert_eq!(err.to_string(), "For comic id=7: Item not found");
    }

    #[test]
    fn field_error_serializes_type_key() {
        let err = FieldError::not_an_integer(vec![json!("path"), json!("comic_id")]);
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["type"], "type_error.integer");
        assert_eq!(value["loc"], json!(["path", "comic_id"]));
    }

    #[test]
    fn rate_limited_message() {
        let err = AppError::RateLimited("1/minute".parse().unwrap());
        assert_eq!(err.to_string(), "Rate limit exceeded: 1 per 1 minute");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
