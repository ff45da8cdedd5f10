//! Public viewer endpoints.
//!
//! - `GET /view/:share_id`: composed SVG view
//! - `GET /view/:share_id/svg`: raw artifact
//! - `GET /view/:share_id/png`: rasterized artifact with a `Description`
//!
//! A non-canonical share id, an unknown board or a board without an
//! artifact are all answered with 404.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::{debug, instrument};

use crate::response::ApiError;
use crate::state::AppState;
use scry_board::{BoardRecord, ShareId};
use scry_common::ScryError;
use scry_render::viewer_compose;

const SVG_TYPE: &str = "image/svg+xml";
const PNG_TYPE: &str = "image/png";
const SVG_CACHE: &str = "public, max-age=60";
const PNG_CACHE: &str = "public, max-age=300";

/// Resolve a share id to a board that has an artifact.
async fn viewable(state: &AppState, share_id: &str) -> Result<BoardRecord, ApiError> {
    let id = ShareId::parse(share_id).ok_or_else(|| ScryError::not_found("board"))?;
    let board = state
        .store()
        .get_by_share_id(&id)
        .await
        .map_err(ScryError::from)?
        .filter(BoardRecord::has_artifact)
        .ok_or_else(|| ScryError::not_found("board"))?;
    Ok(board)
}

#[instrument(skip(state))]
pub async fn view_board(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Response, ApiError> {
    let board = viewable(&state, &share_id).await?;
    let view = viewer_compose(
        &board.name,
        &board.artifact,
        board.width,
        board.height,
        board.alt.as_deref(),
    );
    debug!(name = %board.name, len = view.len(), "Serving composed view");
    Ok((
        [(header::CONTENT_TYPE, SVG_TYPE), (header::CACHE_CONTROL, SVG_CACHE)],
        view,
    )
        .into_response())
}

#[instrument(skip(state))]
pub async fn view_svg(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Response, ApiError> {
    let board = viewable(&state, &share_id).await?;
    Ok((
        [(header::CONTENT_TYPE, SVG_TYPE), (header::CACHE_CONTROL, SVG_CACHE)],
        board.artifact,
    )
        .into_response())
}

#[instrument(skip(state))]
pub async fn view_png(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Response, ApiError> {
    let board = viewable(&state, &share_id).await?;
    let rasterizer = state.rasterizer().clone();
    rasterizer.check_dimensions(board.width, board.height)?;

    let encoded = tokio::task::spawn_blocking(move || {
        rasterizer.board_png(
            &board.name,
            &board.artifact,
            board.width,
            board.height,
            board.alt.as_deref(),
        )
    })
    .await
    .map_err(|e| ScryError::internal(format!("Render task failed: {e}")))??;

    Ok((
        [(header::CONTENT_TYPE, PNG_TYPE), (header::CACHE_CONTROL, PNG_CACHE)],
        encoded,
    )
        .into_response())
}
