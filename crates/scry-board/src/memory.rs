//! In-process board store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tracing::debug;

use crate::model::{BoardRecord, BoardSummary, BoardUpdate, HistoryEntry, NewBoard, ShareId};
use crate::store::BoardStore;
use scry_common::StoreError;

/// Board store held entirely in memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBoardStore {
    boards: DashMap<String, BoardRecord>,
    /// share id -> board name
    shares: DashMap<ShareId, String>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl MemoryBoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}

#[async_trait]
impl BoardStore for MemoryBoardStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<BoardRecord>, StoreError> {
        Ok(self.boards.get(name).map(|b| b.value().clone()))
    }

    async fn get_by_share_id(&self, id: &ShareId) -> Result<Option<BoardRecord>, StoreError> {
        let Some(name) = self.shares.get(id).map(|n| n.value().clone()) else {
            return Ok(None);
        };
        self.get_by_name(&name).await
    }

    async fn create(&self, board: NewBoard) -> Result<ShareId, StoreError> {
        match self.boards.entry(board.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict { name: board.name }),
            Entry::Vacant(slot) => {
                let share_id = ShareId::new();
                let now = Utc::now();
                slot.insert(BoardRecord {
                    name: board.name.clone(),
                    share_id,
                    width: board.width,
                    height: board.height,
                    artifact: board.artifact,
                    namespace: board.namespace,
                    alt: board.alt,
                    created_at: now,
                    updated_at: now,
                });
                self.shares.insert(share_id, board.name);
                debug!(%share_id, "Board created");
                Ok(share_id)
            }
        }
    }

    async fn update(&self, name: &str, update: BoardUpdate) -> Result<(), StoreError> {
        let mut board = self.boards.get_mut(name).ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })?;
        update.apply_to(board.value_mut(), Utc::now());
        Ok(())
    }

    async fn append_history(
        &self,
        board_name: &str,
        artifact: &str,
        alt: Option<&str>,
    ) -> Result<(), StoreError> {
        self.history.lock().push(HistoryEntry {
            board_name: board_name.to_string(),
            artifact: artifact.to_string(),
            alt: alt.map(str::to_string),
            archived_at: Utc::now(),
        });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BoardSummary>, StoreError> {
        let history = self.history.lock();
        let mut summaries: Vec<BoardSummary> = self
            .boards
            .iter()
            .map(|entry| {
                let board = entry.value();
                BoardSummary {
                    name: board.name.clone(),
                    share_id: board.share_id,
                    width: board.width,
                    height: board.height,
                    has_artifact: board.has_artifact(),
                    history_count: history
                        .iter()
                        .filter(|h| h.board_name == board.name)
                        .count(),
                    created_at: board.created_at,
                    updated_at: board.updated_at,
                }
            })
            .collect();
        drop(history);

        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(summaries)
    }

    async fn history(&self, board_name: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .history
            .lock()
            .iter()
            .filter(|h| h.board_name == board_name)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
