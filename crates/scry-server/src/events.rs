//! Board change notifications.
//!
//! Successful executions are broadcast to viewers subscribed through
//! `GET /view/:share_id/events`. Each subscriber only sees changes of the
//! board it asked for.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, instrument};

use crate::response::ApiError;
use crate::state::AppState;
use scry_board::{OutcomeKind, SessionOutcome, ShareId};
use scry_common::ScryError;

/// Pending notifications kept per subscriber before it starts lagging.
pub const EVENT_BUFFER: usize = 64;

/// A board was written by a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardChanged {
    pub share_id: ShareId,
    pub outcome: OutcomeKind,
    pub created: bool,
    pub archived: bool,
}

impl From<&SessionOutcome> for BoardChanged {
    fn from(outcome: &SessionOutcome) -> Self {
        Self {
            share_id: outcome.board.share_id,
            outcome: outcome.kind,
            created: outcome.created,
            archived: outcome.archived,
        }
    }
}

/// `GET /view/:share_id/events`
///
/// Streams a `board` event each time the board is executed. Lagging
/// subscribers skip what they missed.
#[instrument(skip(state))]
pub async fn board_events(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = ShareId::parse(&share_id).ok_or_else(|| ScryError::not_found("board"))?;
    // Subscribe before the lookup so no change between the two is missed
    let rx = state.subscribe();
    state
        .store()
        .get_by_share_id(&id)
        .await
        .map_err(ScryError::from)?
        .ok_or_else(|| ScryError::not_found("board"))?;

    debug!(%id, "Viewer subscribed");
    let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(changed) if changed.share_id == id => Event::default()
            .event("board")
            .json_data(&changed)
            .ok()
            .map(Ok),
        _ => None,
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

