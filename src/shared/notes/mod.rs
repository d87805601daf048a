//! Notes Module
//!
//! Wire types for the notebook → section → note hierarchy:
//!
//! - `Notebook` - Top-level container
//! - `Section` - Nested section (sub-sections via `children`)
//! - `Note` - A document owned by one section
//! - `NoteVersion` - A restorable historical version

pub mod notebook;
pub mod section;
pub mod note;

pub use notebook::{Notebook, NotebookRequest, DEFAULT_NOTEBOOK_COLOR};
pub use section::{MoveSectionRequest, Section, TitleRequest};
pub use note::{
    empty_document, Note, NoteSnapshot, NoteSummary, NoteVersion, PermissionLevel, ShareNoteRequest,
};
