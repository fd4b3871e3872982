//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use braidql_core::error::BraidQLError;
use serde::Serialize;
use tracing::{error, warn};

/// JSON error envelope returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code:    &'static str,
    /// Human-readable message.
    pub message: String,
}

/// Wrapper mapping core errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub BraidQLError);

impl From<BraidQLError> for ApiError {
    fn from(e: BraidQLError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = self.0.error_code(), error = %self.0, "request failed");
        } else {
            warn!(code = self.0.error_code(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            code:    self.0.error_code(),
            message: self.0.to_string(),
        };
        (status, Json(serde_json::json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let response = ApiError(BraidQLError::unauthenticated("no key")).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError(BraidQLError::invalid_intent("blacklisted")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = ApiError(BraidQLError::MissingCollection {
            database: "mongodb".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
