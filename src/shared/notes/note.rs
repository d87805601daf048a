//! Note Data Structure
//!
//! The note content is an opaque structured document owned by the editor.
//! The sync core only moves it between the local buffer and the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::ids::{NoteId, SectionId, VersionId};

/// A note as returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique note ID
    pub id: NoteId,
    /// Owning section
    pub section_id: SectionId,
    /// Display title
    pub title: String,
    /// Editor document (opaque to this crate)
    #[serde(default = "empty_document")]
    pub content: serde_json::Value,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the note is pinned to favourites
    #[serde(default)]
    pub is_pinned: bool,
    /// Last server-side modification
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The empty editor document used for new notes
pub fn empty_document() -> serde_json::Value {
    serde_json::json!({ "type": "doc", "content": [] })
}

impl Note {
    /// Create a local note with a fresh (temporary) id
    pub fn new(section_id: SectionId, title: impl Into<String>) -> Self {
        Self {
            id: NoteId::new(),
            section_id,
            title: title.into(),
            content: empty_document(),
            tags: Vec::new(),
            is_pinned: false,
            updated_at: None,
        }
    }

    /// Capture the persistable part of the note
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }

    /// Apply an editor snapshot to the local copy
    pub fn apply_snapshot(&mut self, snapshot: &NoteSnapshot) {
        self.title = snapshot.title.clone();
        self.content = snapshot.content.clone();
    }
}

/// The value persisted by the save coordinator (`PUT /notes/{id}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteSnapshot {
    pub title: String,
    pub content: serde_json::Value,
}

impl NoteSnapshot {
    pub fn new(title: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            title: title.into(),
            content,
        }
    }
}

/// A historical version of a note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteVersion {
    pub id: VersionId,
    pub note_id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default = "empty_document")]
    pub content: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A search hit (`GET /notes/search`); the server omits the owning section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default = "empty_document")]
    pub content: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Access granted when sharing a note
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    #[default]
    Viewer,
    Editor,
}

/// Request body for `POST /notes/{id}/share`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShareNoteRequest {
    pub username: String,
    pub permission_level: PermissionLevel,
}
