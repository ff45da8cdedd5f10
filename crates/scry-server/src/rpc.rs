//! Tool-style RPC endpoints.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, instrument};

use crate::response::ApiError;
use crate::state::AppState;
use scry_board::{
    BoardSummary, ExecuteRequest, HistoryEntry, OutcomeKind, ShareId, artifact_snippet,
    validate_name,
};
use scry_common::ScryError;

/// Reply to `POST /rpc/execute`.
#[derive(Debug, Serialize)]
pub struct ExecuteReply {
    pub name: String,
    pub share_id: ShareId,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub outcome: OutcomeKind,
    pub created: bool,
    pub archived: bool,
    pub output: String,
    /// Leading part of the artifact, if the board has one.
    pub snippet: Option<String>,
}

/// One row of `POST /rpc/list`.
#[derive(Debug, Serialize)]
pub struct ListedBoard {
    #[serde(flatten)]
    pub summary: BoardSummary,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListReply {
    pub boards: Vec<ListedBoard>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub name: String,
}

/// Reply to `POST /rpc/history`.
#[derive(Debug, Serialize)]
pub struct HistoryReply {
    pub name: String,
    /// Archived artifacts, oldest first.
    pub entries: Vec<HistoryEntry>,
    pub count: usize,
}

/// `POST /rpc/execute {name, code, width?, height?, alt?}`
///
/// The session runs on its own task: once started, the evaluation and
/// every store write finish even if the caller goes away or the request
/// times out.
#[instrument(skip(state, body))]
pub async fn execute(
    State(state): State<AppState>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteReply>, ApiError> {
    let Json(request) = body.map_err(|e| ScryError::validation(e.body_text()))?;

    let task_state = state.clone();
    let outcome = tokio::spawn(
        async move {
            let outcome = task_state.session().execute(&request).await?;
            task_state.publish(&outcome);
            Ok::<_, ScryError>(outcome)
        }
        .in_current_span(),
    )
    .await
    .map_err(|e| ScryError::internal(format!("Execution task failed: {e}")))??;
    let board = outcome.board;

    let url = state.view_url(&board.share_id);
    info!(name = %board.name, url = %url, "Board executed");

    Ok(Json(ExecuteReply {
        snippet: board.has_artifact().then(|| artifact_snippet(&board.artifact)),
        url,
        share_id: board.share_id,
        width: board.width,
        height: board.height,
        outcome: outcome.kind,
        created: outcome.created,
        archived: outcome.archived,
        output: outcome.output,
        name: board.name,
    }))
}

/// `POST /rpc/list {}`
#[instrument(skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<ListReply>, ApiError> {
    let summaries = state.store().list().await.map_err(ScryError::from)?;
    let boards: Vec<ListedBoard> = summaries
        .into_iter()
        .map(|summary| ListedBoard {
            url: state.view_url(&summary.share_id),
            summary,
        })
        .collect();

    Ok(Json(ListReply {
        count: boards.len(),
        boards,
    }))
}

/// `POST /rpc/history {name}`
#[instrument(skip(state, body))]
pub async fn history(
    State(state): State<AppState>,
    body: Result<Json<HistoryRequest>, JsonRejection>,
) -> Result<Json<HistoryReply>, ApiError> {
    let Json(HistoryRequest { name }) = body.map_err(|e| ScryError::validation(e.body_text()))?;
    validate_name(&name)?;

    let store = state.store();
    if store.get_by_name(&name).await.map_err(ScryError::from)?.is_none() {
        return Err(ScryError::not_found("board").into());
    }
    let entries = store.history(&name).await.map_err(ScryError::from)?;

    Ok(Json(HistoryReply {
        count: entries.len(),
        entries,
        name,
    }))
}
