//! Board data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// JSON object snapshot of script-visible variables.
pub type Namespace = Map<String, Value>;

/// Stable public handle for a board.
///
/// A random v4 UUID assigned once at creation. Only the canonical lowercase
/// hyphenated form is accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(Uuid);

impl ShareId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the canonical form; anything else is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() != 36 {
            return None;
        }
        let uuid = Uuid::parse_str(text).ok()?;
        let mut buf = Uuid::encode_buffer();
        (uuid.hyphenated().encode_lower(&mut buf) == text).then_some(Self(uuid))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ShareId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ShareId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for ShareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A persisted board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub name: String,
    pub share_id: ShareId,
    pub width: u32,
    pub height: u32,
    /// SVG text; empty until the first artifact is produced.
    pub artifact: String,
    pub namespace: Namespace,
    pub alt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BoardRecord {
    pub fn has_artifact(&self) -> bool {
        !self.artifact.is_empty()
    }
}

/// Fields for a board that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewBoard {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub artifact: String,
    pub namespace: Namespace,
    pub alt: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct BoardUpdate {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub artifact: Option<String>,
    pub namespace: Option<Namespace>,
    /// `Some(None)` clears the alt text.
    pub alt: Option<Option<String>>,
}

impl BoardUpdate {
    /// Apply this update to `record`, bumping `updated_at`.
    pub fn apply_to(self, record: &mut BoardRecord, now: DateTime<Utc>) {
        if let Some(width) = self.width {
            record.width = width;
        }
        if let Some(height) = self.height {
            record.height = height;
        }
        if let Some(artifact) = self.artifact {
            record.artifact = artifact;
        }
        if let Some(namespace) = self.namespace {
            record.namespace = namespace;
        }
        if let Some(alt) = self.alt {
            record.alt = alt;
        }
        record.updated_at = now;
    }
}

/// A previously-current artifact, archived before being overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Weak reference to the board by name.
    pub board_name: String,
    pub artifact: String,
    pub alt: Option<String>,
    pub archived_at: DateTime<Utc>,
}

/// Listing row for a board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    pub name: String,
    pub share_id: ShareId,
    pub width: u32,
    pub height: u32,
    pub has_artifact: bool,
    pub history_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BoardRecord {
        let now = Utc::now();
        BoardRecord {
            name: "demo".into(),
            share_id: ShareId::new(),
            width: 800,
            height: 600,
            artifact: String::new(),
            namespace: Namespace::new(),
            alt: Some("old".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_share_id_canonical_round_trip() {
        let id = ShareId::new();
        let text = id.to_string();

        assert_eq!(text.len(), 36);
        assert_eq!(ShareId::parse(&text), Some(id));
    }

    #[test]
    fn test_share_id_rejects_non_canonical() {
        let id = ShareId::new();
        let text = id.to_string();

        assert!(ShareId::parse(&text.to_uppercase()).is_none());
        assert!(ShareId::parse(&text.replace('-', "")).is_none());
        assert!(ShareId::parse(&format!("{{{text}}}")).is_none());
        assert!(ShareId::parse("demo").is_none());
        assert!(ShareId::parse("").is_none());
    }

    #[test]
    fn test_share_ids_are_unique() {
        assert_ne!(ShareId::new(), ShareId::new());
    }

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let mut board = record();
        let share_id = board.share_id;
        let created = board.created_at;
        let later = created + chrono::Duration::seconds(5);

        BoardUpdate {
            width: Some(1024),
            ..Default::default()
        }
        .apply_to(&mut board, later);

        assert_eq!(board.width, 1024);
        assert_eq!(board.height, 600);
        assert_eq!(board.alt.as_deref(), Some("old"));
        assert_eq!(board.share_id, share_id);
        assert_eq!(board.created_at, created);
        assert_eq!(board.updated_at, later);
    }

    #[test]
    fn test_update_can_clear_alt() {
        let mut board = record();
        BoardUpdate {
            alt: Some(None),
            ..Default::default()
        }
        .apply_to(&mut board, Utc::now());

        assert!(board.alt.is_none());
    }
}
