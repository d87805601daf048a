//! notesync - client synchronization core
//!
//! Keeps a user's locally edited notebooks consistent with the server while
//! consuming push notifications (new chat messages, sidebar invalidations)
//! delivered as STOMP topics over one shared WebSocket.
//!
//! # Module Structure
//!
//! - **`shared`** - Wire types, ids, errors and configuration
//! - **`client`** - Connection, topic router, save coordinator, tree store
//!   and the sync coordinator that ties them together
//! - **`logging`** - Optional tracing subscriber setup
//!
//! # Usage
//!
//! ```rust,no_run
//! use notesync::client::{Config, Session};
//!
//! # async fn example() -> notesync::shared::SyncResult<()> {
//! let mut config = Config::from_env().expect("valid environment");
//! config.set_token(Some("token".to_string()));
//! let session = Session::connect(config)?;
//! session.workspace().load_notebooks().await?;
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Client-side sync core
pub mod client;

/// Tracing setup
pub mod logging;

pub use shared::{SyncError, SyncResult};
