//! Messaging Module
//!
//! This module contains the data structures for the chat side of the app:
//!
//! - `Conversation` - A conversation between users
//! - `Message` - A message in a conversation
//!
//! # Usage
//!
//! ```rust
//! use notesync::shared::messaging::{Conversation, Message};
//! ```

pub mod message;
pub mod conversation;

// Re-export all types
pub use message::{Message, MessageKind, MessagePage, MessageStatus, SendMessageRequest};
pub use conversation::{Conversation, ConversationType};
