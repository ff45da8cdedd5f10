//! Boards: named canvases pairing a script namespace with an SVG artifact.
//!
//! - [`model`]: board records, share identifiers and history entries
//! - [`validate`]: input checks run before any evaluation or store access
//! - [`store`]: the [`BoardStore`] persistence contract, implemented by
//!   [`MemoryBoardStore`] and the PostgREST-backed [`RestBoardStore`]
//! - [`session`]: [`ExecutionSession`], which runs a script once and commits
//!   its outcome

pub mod memory;
pub mod model;
pub mod rest;
pub mod session;
pub mod store;
pub mod validate;

pub use memory::MemoryBoardStore;
pub use model::{
    BoardRecord, BoardSummary, BoardUpdate, HistoryEntry, Namespace, NewBoard, ShareId,
};
pub use rest::RestBoardStore;
pub use session::{
    ExecuteRequest, ExecutionSession, OutcomeKind, SessionOutcome, artifact_snippet,
};
pub use store::BoardStore;
pub use validate::validate_name;
