//! Section Data Structure
//!
//! Sections form a tree inside a notebook. The server returns them nested
//! (`?hierarchical=true`); the tree store flattens them into an arena.

use serde::{Deserialize, Serialize};

use crate::shared::ids::{NotebookId, SectionId};

/// A section as returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Unique section ID
    pub id: SectionId,
    /// Display title
    pub title: String,
    /// Parent section, `None` for notebook-level sections
    #[serde(default)]
    pub parent_id: Option<SectionId>,
    /// Owning notebook
    pub notebook_id: NotebookId,
    /// Ordered child sections
    #[serde(default)]
    pub children: Vec<Section>,
}

impl Section {
    /// Walk the subtree depth-first, parents before children
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Section)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of sections in this subtree, including `self`
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

/// Request body carrying only a title
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

/// Request body for reparenting a section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSectionRequest {
    pub parent_id: Option<SectionId>,
}
