//! Push Event Payloads
//!
//! Payloads delivered on the user's private sidebar destination. They are
//! transient: consumed once by the sync coordinator and discarded.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of sidebar event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SidebarEventType {
    /// The notebook/section tree changed server-side
    #[serde(alias = "REFRESH_FOLDERS")]
    Refresh,
    /// Any type this client does not handle
    #[serde(other)]
    Unknown,
}

/// Sidebar invalidation event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarEvent {
    /// Type of event
    #[serde(rename = "type")]
    pub kind: SidebarEventType,
    /// Notebook or section the event is about, if any
    #[serde(default, alias = "folderId")]
    pub target_id: Option<Uuid>,
    /// Producer tag (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SidebarEvent {
    /// Create a refresh event
    pub fn refresh(target_id: Option<Uuid>) -> Self {
        Self {
            kind: SidebarEventType::Refresh,
            target_id,
            source: None,
        }
    }

    pub fn is_refresh(&self) -> bool {
        self.kind == SidebarEventType::Refresh
    }
}
