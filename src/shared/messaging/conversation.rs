//! Conversation Data Structure
//!
//! Represents a conversation between two or more users (or with the assistant).

use serde::{Deserialize, Serialize};

use crate::shared::ids::{ConversationId, UserId};

/// Kind of conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationType {
    Direct,
    Group,
    Ai,
}

/// Represents a conversation between users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,
    /// Kind of conversation
    #[serde(rename = "type")]
    pub kind: ConversationType,
    /// Participant user IDs
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    /// Optional display name (groups)
    #[serde(default)]
    pub title: Option<String>,
}

impl Conversation {
    /// Check if user is a participant
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participant_ids.contains(&user_id)
    }

    /// Get the other participant (for direct messages)
    pub fn other_participant(&self, current_user_id: UserId) -> Option<UserId> {
        if self.kind != ConversationType::Direct {
            return None;
        }
        self.participant_ids
            .iter()
            .find(|&&id| id != current_user_id)
            .copied()
    }
}
