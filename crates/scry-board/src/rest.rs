//! PostgREST-backed board store.
//!
//! Talks to two tables:
//!
//! - `boards` (name unique, share_id, width, height, svg, namespace jsonb,
//!   alt, created_at, updated_at)
//! - `board_history` (board_name, svg, alt, archived_at)

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::model::{
    BoardRecord, BoardSummary, BoardUpdate, HistoryEntry, Namespace, NewBoard, ShareId,
};
use crate::store::BoardStore;
use scry_common::StoreError;

const BOARDS: &str = "boards";
const HISTORY: &str = "board_history";

#[derive(Debug, Serialize, Deserialize)]
struct BoardRow {
    name: String,
    share_id: ShareId,
    width: u32,
    height: u32,
    #[serde(default)]
    svg: String,
    #[serde(default)]
    namespace: Namespace,
    alt: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BoardRow> for BoardRecord {
    fn from(row: BoardRow) -> Self {
        Self {
            name: row.name,
            share_id: row.share_id,
            width: row.width,
            height: row.height,
            artifact: row.svg,
            namespace: row.namespace,
            alt: row.alt,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct BoardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    svg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<Namespace>,
    /// `Some(None)` serializes as `null`, clearing the column.
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<Option<String>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    board_name: String,
    svg: String,
    alt: Option<String>,
    archived_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    name: String,
    share_id: ShareId,
    width: u32,
    height: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
}

/// Board store backed by a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestBoardStore {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl RestBoardStore {
    /// Create a store against `base_url` (e.g. `https://db.example.com/rest/v1`).
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::backend(format!("Failed to create HTTP client: {e}")))?;
        Self::with_client(client, base_url, api_key)
    }

    /// Create a store with a custom HTTP client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| StoreError::backend(format!("Invalid store URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    /// URL of `table` with the given query parameters.
    fn table_url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self
            .base
            .join(table)
            .map_err(|e| StoreError::backend(format!("Invalid table URL: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::backend(format!("Request failed: {e}")))
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, StoreError> {
        let response = check(self.send(self.client.get(url)).await?).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::backend(format!("Invalid response body: {e}")))
    }

    /// Exact row count of `board_history` for one board, from the
    /// `Content-Range` of a body-less request.
    async fn history_count(&self, board_name: &str) -> Result<usize, StoreError> {
        let filter = format!("eq.{board_name}");
        let url = self.table_url(HISTORY, &[("select", "board_name"), ("board_name", &filter)])?;
        let request = self.client.head(url).header("Prefer", "count=exact");
        let response = check(self.send(request).await?).await?;
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total)
            .ok_or_else(|| StoreError::backend("Missing row count in Content-Range"))
    }

    async fn get_one(&self, column: &str, value: &str) -> Result<Option<BoardRecord>, StoreError> {
        let filter = format!("eq.{value}");
        let url = self.table_url(BOARDS, &[(column, &filter), ("limit", "1")])?;
        let rows: Vec<BoardRow> = self.fetch(url).await?;
        Ok(rows.into_iter().next().map(BoardRecord::from))
    }
}

/// Total from a `Content-Range` value such as `0-24/312` or `*/0`.
fn parse_total(range: &str) -> Option<usize> {
    range.rsplit_once('/')?.1.parse().ok()
}

/// Map non-success statuses to store errors.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(%status, body = %body, "Store request rejected");
    Err(StoreError::backend(format!("HTTP {status}")))
}

#[async_trait]
impl BoardStore for RestBoardStore {
    #[instrument(skip(self))]
    async fn get_by_name(&self, name: &str) -> Result<Option<BoardRecord>, StoreError> {
        self.get_one("name", name).await
    }

    #[instrument(skip(self))]
    async fn get_by_share_id(&self, id: &ShareId) -> Result<Option<BoardRecord>, StoreError> {
        self.get_one("share_id", &id.to_string()).await
    }

    #[instrument(skip(self, board), fields(name = %board.name))]
    async fn create(&self, board: NewBoard) -> Result<ShareId, StoreError> {
        let now = Utc::now();
        let row = BoardRow {
            name: board.name,
            share_id: ShareId::new(),
            width: board.width,
            height: board.height,
            svg: board.artifact,
            namespace: board.namespace,
            alt: board.alt,
            created_at: now,
            updated_at: now,
        };

        let url = self.table_url(BOARDS, &[])?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .header("Prefer", "return=minimal")
                    .json(&row),
            )
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(StoreError::Conflict { name: row.name });
        }
        check(response).await?;

        debug!(share_id = %row.share_id, "Board created");
        Ok(row.share_id)
    }

    #[instrument(skip(self, update))]
    async fn update(&self, name: &str, update: BoardUpdate) -> Result<(), StoreError> {
        let patch = BoardPatch {
            width: update.width,
            height: update.height,
            svg: update.artifact,
            namespace: update.namespace,
            alt: update.alt,
            updated_at: Utc::now(),
        };

        let filter = format!("eq.{name}");
        let url = self.table_url(BOARDS, &[("name", &filter), ("select", "name")])?;
        let response = check(
            self.send(
                self.client
                    .patch(url)
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?,
        )
        .await?;

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::backend(format!("Invalid response body: {e}")))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, artifact, alt))]
    async fn append_history(
        &self,
        board_name: &str,
        artifact: &str,
        alt: Option<&str>,
    ) -> Result<(), StoreError> {
        let row = HistoryRow {
            board_name: board_name.to_string(),
            svg: artifact.to_string(),
            alt: alt.map(str::to_string),
            archived_at: Utc::now(),
        };
        let url = self.table_url(HISTORY, &[])?;
        check(
            self.send(
                self.client
                    .post(url)
                    .header("Prefer", "return=minimal")
                    .json(&row),
            )
            .await?,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<BoardSummary>, StoreError> {
        let boards_url = self.table_url(
            BOARDS,
            &[
                ("select", "name,share_id,width,height,created_at,updated_at"),
                ("order", "created_at.asc,name.asc"),
            ],
        )?;
        let rows: Vec<SummaryRow> = self.fetch(boards_url).await?;

        let drawn_url = self.table_url(BOARDS, &[("select", "name"), ("svg", "neq.")])?;
        let drawn: HashSet<String> = self
            .fetch::<NameRow>(drawn_url)
            .await?
            .into_iter()
            .map(|row| row.name)
            .collect();

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(BoardSummary {
                history_count: self.history_count(&row.name).await?,
                has_artifact: drawn.contains(&row.name),
                name: row.name,
                share_id: row.share_id,
                width: row.width,
                height: row.height,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        Ok(summaries)
    }

    #[instrument(skip(self))]
    async fn history(&self, board_name: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let filter = format!("eq.{board_name}");
        let url = self.table_url(
            HISTORY,
            &[("board_name", &filter), ("order", "archived_at.asc")],
        )?;
        let rows: Vec<HistoryRow> = self.fetch(url).await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                board_name: row.board_name,
                artifact: row.svg,
                alt: row.alt,
                archived_at: row.archived_at,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), StoreError> {
        let url = self.table_url(BOARDS, &[("select", "name"), ("limit", "1")])?;
        check(self.send(self.client.get(url)).await?).await?;
        Ok(())
    }
}
