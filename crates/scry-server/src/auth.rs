//! Bearer-token guard for the RPC surface.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::response::ApiError;
use crate::state::AppState;
use scry_common::ScryError;

/// Check the `Authorization: Bearer` header against `expected`.
///
/// With no expected token every request passes.
pub fn verify_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ScryError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ScryError::Unauthorized {
            reason: "missing bearer token",
        })?;

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ScryError::Unauthorized {
            reason: "invalid bearer token",
        })
    }
}

/// Middleware rejecting RPC calls without the configured token.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Err(e) = verify_bearer(request.headers(), state.auth_token()) {
        warn!(path = %request.uri().path(), error = %e, "Rejected RPC call");
        return ApiError::from(e).into_response();
    }
    next.run(request).await
}
