//! Typed event broadcasting.
//!
//! The [`EventBus`] distributes [`SyncEvent`]s from the sync core to any
//! number of observers (presentation layer, tests). It is a thin wrapper over
//! a tokio broadcast channel: emitting never blocks, and a subscriber that
//! falls more than `capacity` events behind skips the oldest ones.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::channel::ConnectionState;
use crate::client::save::SaveStatus;
use crate::shared::ids::{ConversationId, MessageId, NoteId, NotebookId};

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 1024;

/// Signals emitted by the sync core.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Push connection lifecycle changed
    Connection(ConnectionState),
    /// A document's save state changed
    SaveStatus { note_id: NoteId, status: SaveStatus },
    /// A remote write failed and was not retried
    PersistFailed { resource: String, message: String },
    /// A pin toggle reached its final server state
    PinSettled { note_id: NoteId, pinned: bool },
    /// Tree data was refetched; `None` means the notebook list
    TreeRefreshed { notebook_id: Option<NotebookId> },
    /// A notebook or section appeared that the client had not seen before
    NewlyArrived { id: Uuid },
    /// The "newly arrived" marker expired
    ArrivalCleared { id: Uuid },
    /// A message was appended to a conversation's list
    MessageAppended {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// History for the selected conversation finished loading
    HistoryLoaded {
        conversation_id: ConversationId,
        count: usize,
    },
}

/// Broadcast bus for a single event type.
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a new EventBus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new EventBus with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event; with no
    /// subscribers the event is dropped and 0 is returned.
    pub fn emit(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Get the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
