//! API error responses.
//!
//! Errors raised on the discovery path are converted here into HTTP
//! responses. The JSON body carries the error class name, the request id,
//! and a client-safe description when the error has one; raw detail stays in
//! the server log. Statuses that the protocol defines as body-less (304,
//! 404) produce an empty body.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::HeadwaterError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    description: Option<String>,
    request_id: String,
}

/// JSON error body: `{"error": "...", "request_id": "...", "description": "..."}`.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ApiError {
    pub fn new(error: &HeadwaterError, request_id: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(error.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error: error.kind(),
            description: error.public_description(),
            request_id: request_id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status == StatusCode::NOT_FOUND || self.status == StatusCode::NOT_MODIFIED {
            return self.status.into_response();
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                request_id: self.request_id,
                description: self.description,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AuthErrorType;

    #[test]
    fn auth_failures_map_to_401_with_redacted_body() {
        let error = HeadwaterError::auth("key 2 of 3 rejected", AuthErrorType::InvalidToken);
        let api_error = ApiError::new(&error, "req-1");
        assert_eq!(api_error.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(api_error.error, "AuthFailure");
        assert!(!api_error.description.as_deref().unwrap_or("").contains("key 2"));
    }

    #[test]
    fn not_found_has_no_body() {
        let error = HeadwaterError::not_found("template", "default/gadgets");
        let response = ApiError::new(&error, "req-1").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
