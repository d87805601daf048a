//! Chat Message Data Structure
//!
//! Represents a message in a conversation. Messages are append-only from the
//! client's perspective and ordered by the server timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::ids::{ConversationId, MessageId, UserId};

/// Delivery status reported by the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

/// Type of message content on send
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// Message carrying an uploaded image
    Image,
}

/// Represents a chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Conversation this message belongs to
    pub conversation_id: ConversationId,
    /// User who sent the message
    pub sender_id: UserId,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Reference to attached media, if any
    #[serde(default, alias = "mediaUrl")]
    pub media_ref: Option<String>,
    /// Message this one replies to
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    /// Server timestamp; the ordering authority
    pub created_at: DateTime<Utc>,
    /// Delivery status
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let mut preview: String = self.content.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }
}

/// Request to send a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

impl SendMessageRequest {
    /// A text message
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            media_url: None,
            reply_to_id: None,
        }
    }

    /// Attach media; switches the kind to `IMAGE`
    pub fn with_media(mut self, media_url: impl Into<String>) -> Self {
        self.media_url = Some(media_url.into());
        self.kind = MessageKind::Image;
        self
    }

    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply_to_id = Some(message_id);
        self
    }
}

/// Paged history response (`GET /chat/conversations/{id}/messages`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePage {
    #[serde(default)]
    pub content: Vec<Message>,
}
