//! Notebook Data Structure
//!
//! A notebook is the top-level container of the workspace tree.

use serde::{Deserialize, Serialize};

use crate::shared::ids::NotebookId;

/// Default accent color for new notebooks
pub const DEFAULT_NOTEBOOK_COLOR: &str = "#6366f1";

/// A notebook as returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    /// Unique notebook ID
    pub id: NotebookId,
    /// Display title
    pub title: String,
    /// Accent color (CSS hex string)
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_NOTEBOOK_COLOR.to_string()
}

impl Notebook {
    /// Create a local notebook with a fresh (temporary) id
    pub fn new(title: impl Into<String>, color: Option<String>) -> Self {
        Self {
            id: NotebookId::new(),
            title: title.into(),
            color: color.unwrap_or_else(default_color),
        }
    }
}

/// Request body for creating or updating a notebook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookRequest {
    pub title: String,
    pub color: String,
}
