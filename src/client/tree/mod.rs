//! Notebook / section / note hierarchy.
//!
//! The tree is an arena keyed by id: notebooks hold an ordered list of root
//! sections, sections hold ordered child and note lists plus a parent link.
//! All mutations validate first and either apply completely or not at all.

pub mod store;

use uuid::Uuid;

use crate::shared::error::{SyncError, SyncResult};
use crate::shared::ids::{NoteId, NotebookId, SectionId};
use crate::shared::notes::Notebook;

pub use store::TreeStore;

/// A notebook and its ordered root sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookNode {
    pub notebook: Notebook,
    pub roots: Vec<SectionId>,
}

/// A section with explicit parent/children index lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub id: SectionId,
    pub title: String,
    pub notebook_id: NotebookId,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
    pub notes: Vec<NoteId>,
}

/// An ordered child list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// The workspace's notebook list
    Notebooks,
    /// Root sections of a notebook
    Notebook(NotebookId),
    /// Sub-sections of a section
    Section(SectionId),
    /// Notes of a section
    SectionNotes(SectionId),
}

/// Any node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Notebook(NotebookId),
    Section(SectionId),
    Note(NoteId),
}

impl NodeRef {
    pub fn uuid(&self) -> Uuid {
        match self {
            NodeRef::Notebook(id) => id.as_uuid(),
            NodeRef::Section(id) => id.as_uuid(),
            NodeRef::Note(id) => id.as_uuid(),
        }
    }
}

/// Where a node sat before a mutation, for reverting it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub parent: ParentRef,
    pub index: usize,
}

/// Everything a cascading delete removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    pub notebooks: Vec<NotebookId>,
    pub sections: Vec<SectionId>,
    pub notes: Vec<NoteId>,
    pub placement: Option<Placement>,
}

/// Trimmed, non-blank title
pub fn validate_title(title: &str) -> SyncResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SyncError::validation("title", "title must not be blank"));
    }
    Ok(trimmed.to_string())
}
