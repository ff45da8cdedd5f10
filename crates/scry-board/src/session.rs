//! Execution sessions: validate, evaluate once, decide, commit.
//!
//! A session runs the guest exactly once per request and never retries.
//! The decision table:
//!
//! | Guest response            | Result                 | Persisted                                   |
//! |---------------------------|------------------------|---------------------------------------------|
//! | not JSON / bad `scope`    | `Internal`             | nothing                                     |
//! | `error` set               | `GuestExecution`       | nothing                                     |
//! | no error, no artifact     | `SucceededNoArtifact`  | namespace, dimensions, alt if supplied      |
//! | no error, artifact        | `SucceededArtifact`    | prior artifact to history, then everything  |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::model::{BoardRecord, BoardUpdate, Namespace, NewBoard};
use crate::store::BoardStore;
use crate::validate::validate_inputs;
use scry_common::{LimitsConfig, ScryError};
use scry_core::{EvalRequest, Evaluator};

/// Maximum artifact snippet length in bytes, before the ellipsis.
pub const SNIPPET_BYTES: usize = 200;

/// A request to run a script against a named board.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub alt: Option<String>,
}

/// The guest's single JSON response.
#[derive(Debug, Deserialize)]
struct GuestResponse {
    #[serde(default)]
    svg: Option<String>,
    #[serde(default)]
    stdout: String,
    /// JSON-encoded namespace object.
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// How a successful execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    SucceededArtifact,
    SucceededNoArtifact,
}

/// Result of a committed execution.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub kind: OutcomeKind,
    /// The board as persisted after the commit.
    pub board: BoardRecord,
    /// Captured guest output.
    pub output: String,
    /// The board did not exist before this execution.
    pub created: bool,
    /// A prior artifact was moved to history.
    pub archived: bool,
}

/// Runs scripts against boards.
#[derive(Clone)]
pub struct ExecutionSession {
    evaluator: Arc<dyn Evaluator>,
    store: Arc<dyn BoardStore>,
    limits: LimitsConfig,
}

impl ExecutionSession {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        store: Arc<dyn BoardStore>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            evaluator,
            store,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Execute `request` and commit its outcome.
    ///
    /// # Errors
    ///
    /// - [`ScryError::Validation`] before any evaluator call or store access
    /// - [`ScryError::GuestExecution`] when the script fails; nothing is committed
    /// - [`ScryError::Internal`] / [`ScryError::Decode`] for malformed guest output
    /// - [`ScryError::Store`] when persistence fails; the script is not re-run
    #[instrument(skip(self, request), fields(name = %request.name, code_len = request.code.len()))]
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<SessionOutcome, ScryError> {
        validate_inputs(
            &request.name,
            &request.code,
            request.width,
            request.height,
            request.alt.as_deref(),
            &self.limits,
        )?;

        let existing = self.store.get_by_name(&request.name).await?;
        let width = request
            .width
            .or(existing.as_ref().map(|b| b.width))
            .unwrap_or(self.limits.default_width);
        let height = request
            .height
            .or(existing.as_ref().map(|b| b.height))
            .unwrap_or(self.limits.default_height);

        let namespace_json = match &existing {
            Some(board) => serde_json::to_string(&board.namespace)
                .map_err(|e| ScryError::internal(format!("Failed to encode namespace: {e}")))?,
            None => "{}".to_string(),
        };

        let eval = EvalRequest {
            code: request.code.clone(),
            namespace_json,
            width,
            height,
        };
        let raw = self.evaluator.evaluate(&eval).await.map_err(|e| {
            warn!(error = %e, "Evaluation failed");
            ScryError::from(e)
        })?;

        let response = parse_response(&raw)?;
        if let Some(message) = response.error {
            info!(message = %message, "Script reported an error; nothing committed");
            return Err(ScryError::GuestExecution {
                message,
                output: response.stdout,
            });
        }
        let namespace = parse_scope(response.scope.as_deref())?;
        let artifact = response.svg.filter(|svg| !svg.is_empty());

        let kind = if artifact.is_some() {
            OutcomeKind::SucceededArtifact
        } else {
            OutcomeKind::SucceededNoArtifact
        };
        let created = existing.is_none();
        let archived = self
            .commit(request, existing, artifact, namespace, width, height)
            .await?;

        let board = self.store.get_by_name(&request.name).await?.ok_or_else(|| {
            error!("Board vanished after commit");
            ScryError::internal(format!("board '{}' missing after commit", request.name))
        })?;

        info!(
            share_id = %board.share_id,
            ?kind,
            created,
            archived,
            "Execution committed"
        );
        Ok(SessionOutcome {
            kind,
            board,
            output: response.stdout,
            created,
            archived,
        })
    }

    /// Persist an outcome. Returns whether a prior artifact was archived.
    async fn commit(
        &self,
        request: &ExecuteRequest,
        existing: Option<BoardRecord>,
        artifact: Option<String>,
        namespace: Namespace,
        width: u32,
        height: u32,
    ) -> Result<bool, ScryError> {
        let Some(prior) = existing else {
            self.store
                .create(NewBoard {
                    name: request.name.clone(),
                    width,
                    height,
                    artifact: artifact.unwrap_or_default(),
                    namespace,
                    alt: request.alt.clone(),
                })
                .await?;
            return Ok(false);
        };

        let mut archived = false;
        let update = match artifact {
            Some(artifact) => {
                if prior.has_artifact() {
                    self.store
                        .append_history(&prior.name, &prior.artifact, prior.alt.as_deref())
                        .await?;
                    archived = true;
                    debug!("Prior artifact archived");
                }
                BoardUpdate {
                    width: Some(width),
                    height: Some(height),
                    artifact: Some(artifact),
                    namespace: Some(namespace),
                    alt: Some(request.alt.clone()),
                }
            }
            None => BoardUpdate {
                width: Some(width),
                height: Some(height),
                artifact: None,
                namespace: Some(namespace),
                alt: request.alt.clone().map(Some),
            },
        };

        self.store.update(&prior.name, update).await?;
        Ok(archived)
    }
}

fn parse_response(raw: &str) -> Result<GuestResponse, ScryError> {
    serde_json::from_str(raw).map_err(|e| {
        error!(error = %e, response_len = raw.len(), "Malformed guest response");
        ScryError::internal(format!("Malformed guest response: {e}"))
    })
}

fn parse_scope(scope: Option<&str>) -> Result<Namespace, ScryError> {
    let scope = scope.ok_or_else(|| ScryError::internal("Guest response has no scope"))?;
    serde_json::from_str(scope).map_err(|e| {
        error!(error = %e, "Guest scope is not a JSON object");
        ScryError::internal(format!("Guest scope is not a JSON object: {e}"))
    })
}

/// First [`SNIPPET_BYTES`] bytes of `text`, cut on a char boundary, with
/// `...` appended when anything was dropped.
pub fn artifact_snippet(text: &str) -> String {
    if text.len() <= SNIPPET_BYTES {
        return text.to_string();
    }
    let mut end = SNIPPET_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
