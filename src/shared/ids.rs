//! Strongly typed identifiers
//!
//! Server ids are UUIDs. Entities created locally get a fresh v4 id that is
//! used until the server responds with the authoritative one.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh id (used for optimistic, not-yet-persisted entities)
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Notebook identifier
    NotebookId
);
define_id!(
    /// Section identifier
    SectionId
);
define_id!(
    /// Note identifier
    NoteId
);
define_id!(
    /// Note version identifier
    VersionId
);
define_id!(
    /// Conversation identifier
    ConversationId
);
define_id!(
    /// Message identifier
    MessageId
);
define_id!(
    /// User identifier
    UserId
);
