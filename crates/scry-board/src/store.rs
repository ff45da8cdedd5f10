//! Board persistence contract.

use async_trait::async_trait;

use crate::model::{BoardRecord, BoardSummary, BoardUpdate, HistoryEntry, NewBoard, ShareId};
use scry_common::StoreError;

/// Persistence for boards and their archived artifacts.
///
/// Implementations are last-write-wins; no atomicity is promised across
/// `append_history` and `update`.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Look up a board by its mutable name.
    async fn get_by_name(&self, name: &str) -> Result<Option<BoardRecord>, StoreError>;

    /// Look up a board by its public share identifier.
    async fn get_by_share_id(&self, id: &ShareId) -> Result<Option<BoardRecord>, StoreError>;

    /// Create a board with a fresh share identifier.
    ///
    /// Fails with [`StoreError::Conflict`] if the name is taken.
    async fn create(&self, board: NewBoard) -> Result<ShareId, StoreError>;

    /// Apply a partial update. Share id and creation time never change.
    ///
    /// Fails with [`StoreError::NotFound`] if no board has this name.
    async fn update(&self, name: &str, update: BoardUpdate) -> Result<(), StoreError>;

    /// Archive a previously-current artifact. Insert-only.
    async fn append_history(
        &self,
        board_name: &str,
        artifact: &str,
        alt: Option<&str>,
    ) -> Result<(), StoreError>;

    /// All boards, oldest first, with archived-history counts.
    async fn list(&self) -> Result<Vec<BoardSummary>, StoreError>;

    /// Archived artifacts of one board in insertion order.
    async fn history(&self, board_name: &str) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Cheap reachability check used for readiness.
    async fn ping(&self) -> Result<(), StoreError>;
}
