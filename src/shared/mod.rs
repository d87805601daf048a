//! Shared Module
//!
//! This module contains the wire types shared by every component of the sync
//! core: notebook/section/note entities, chat entities, push event payloads,
//! the error taxonomy and the application configuration.
//!
//! # Overview
//!
//! All types are plain data designed for JSON (camelCase) serialization over
//! REST and over the STOMP push connection.

/// Strongly typed identifiers
pub mod ids;

/// Notebook / section / note types
pub mod notes;

/// Chat types
pub mod messaging;

/// Push event payloads
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use ids::{ConversationId, MessageId, NoteId, NotebookId, SectionId, UserId, VersionId};
pub use notes::{Note, NoteSnapshot, NoteVersion, Notebook, Section};
pub use messaging::{Conversation, ConversationType, Message, MessageStatus};
pub use event::{SidebarEvent, SidebarEventType};
pub use error::{SyncError, SyncResult};
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
