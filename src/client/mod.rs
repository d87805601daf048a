//! Client Sync Core
//!
//! Everything that runs in the application process: the push channel and
//! topic router, the local notebook tree with its save and pin coordinators,
//! message lists and the coordinator that applies push events.
//!
//! # Module Structure
//!
//! - **`channel`** - STOMP framing, transports, supervised connection
//! - **`router`** - Topic subscriptions over the shared connection
//! - **`save`** - Debounced per-document persistence
//! - **`pin`** - Pin flag convergence against the toggle endpoint
//! - **`tree`** - Arena of notebooks, sections and notes
//! - **`workspace`** - Local-first tree operations
//! - **`sync`** - Sidebar and conversation topic handling
//! - **`api`** - REST client
//! - **`session`** - Wiring of all of the above for one user

pub mod api;
pub mod arrivals;
pub mod channel;
pub mod config;
pub mod events;
pub mod messages;
pub mod pin;
pub mod router;
pub mod save;
pub mod session;
pub mod sync;
pub mod tree;
pub mod workspace;

pub use api::{HttpRemote, RemoteStore};
pub use config::Config;
pub use events::{EventBus, SyncEvent};
pub use router::{Delivery, SubscriptionHandle, TopicRouter};
pub use save::{NotePersister, SaveCoordinator, SaveStatus};
pub use session::Session;
pub use sync::SyncCoordinator;
pub use tree::TreeStore;
pub use workspace::NotesWorkspace;
