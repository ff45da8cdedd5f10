//! Error-to-HTTP mapping.
//!
//! | Error              | Status | Body                                  |
//! |--------------------|--------|---------------------------------------|
//! | `Validation`       | 400    | `{error}`                             |
//! | `Unauthorized`     | 401    | `{error}`                             |
//! | `NotFound`         | 404    | `{error}`                             |
//! | `GuestExecution`   | 422    | `{error, output}`                     |
//! | `TooLarge`         | 422    | `{error, width, height, max}`         |
//! | everything else    | 500    | `{error}` with a generic message      |

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use scry_common::ScryError;
use scry_render::RenderError;

/// A [`ScryError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ScryError);

impl From<ScryError> for ApiError {
    fn from(err: ScryError) -> Self {
        Self(err)
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ScryError::Validation { .. } => StatusCode::BAD_REQUEST,
            ScryError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ScryError::NotFound { .. } => StatusCode::NOT_FOUND,
            ScryError::GuestExecution { .. } | ScryError::TooLarge { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ScryError::Decode { .. } | ScryError::Internal { .. } | ScryError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = match &self.0 {
            ScryError::GuestExecution { message, output } => json!({
                "error": message,
                "output": output,
            }),
            ScryError::TooLarge { width, height, max } => json!({
                "error": self.0.to_string(),
                "width": width,
                "height": height,
                "max": max,
            }),
            ScryError::NotFound { .. } => json!({ "error": "Not found" }),
            other => json!({ "error": other.public_message() }),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
