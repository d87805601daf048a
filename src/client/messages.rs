//! Message lists per conversation.
//!
//! Lists are ordered by server time and deduplicated by message id, so the
//! same push delivered twice (or a push racing the history fetch) lands once.

use std::collections::{HashMap, HashSet};

use crate::shared::ids::{ConversationId, MessageId};
use crate::shared::messaging::Message;

#[derive(Debug, Default)]
struct MessageList {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageList {
    fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        // Equal timestamps keep arrival order
        let index = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);
        self.messages.insert(index, message);
        true
    }
}

/// Messages of every conversation the client has opened
#[derive(Debug, Default)]
pub struct MessageLists {
    lists: HashMap<ConversationId, MessageList>,
}

impl MessageLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a conversation's list with fetched history.
    ///
    /// Messages already held locally that the history does not contain are
    /// kept (they arrived by push after the page was produced).
    pub fn set_history(&mut self, conversation_id: ConversationId, history: Vec<Message>) -> usize {
        let previous = self.lists.remove(&conversation_id).unwrap_or_default();
        let mut list = MessageList::default();
        for message in history.into_iter().chain(previous.messages) {
            if message.conversation_id == conversation_id {
                list.insert(message);
            }
        }
        let count = list.messages.len();
        self.lists.insert(conversation_id, list);
        count
    }

    /// Add one message. Returns `false` when it was already present.
    pub fn append(&mut self, message: Message) -> bool {
        self.lists
            .entry(message.conversation_id)
            .or_default()
            .insert(message)
    }

    pub fn messages(&self, conversation_id: ConversationId) -> &[Message] {
        self.lists
            .get(&conversation_id)
            .map(|list| list.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn contains(&self, conversation_id: ConversationId, message_id: MessageId) -> bool {
        self.lists
            .get(&conversation_id)
            .is_some_and(|list| list.ids.contains(&message_id))
    }

    pub fn last(&self, conversation_id: ConversationId) -> Option<&Message> {
        self.messages(conversation_id).last()
    }

    pub fn clear(&mut self, conversation_id: ConversationId) {
        self.lists.remove(&conversation_id);
    }
}
