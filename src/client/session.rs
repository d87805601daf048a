//! Wiring of one user session.

use std::sync::Arc;

use crate::client::api::{HttpRemote, RemoteStore};
use crate::client::arrivals::NewArrivals;
use crate::client::channel::{ChannelConnection, ConnectOptions, ConnectionHandle, Transport, WebSocketTransport};
use crate::client::config::Config;
use crate::client::events::{EventBus, SyncEvent};
use crate::client::router::TopicRouter;
use crate::client::sync::SyncCoordinator;
use crate::client::workspace::NotesWorkspace;
use crate::shared::config::ConfigError;
use crate::shared::error::{SyncError, SyncResult};

/// Connection, router, workspace and coordinator of a signed-in user
pub struct Session {
    bus: EventBus<SyncEvent>,
    connection: ConnectionHandle,
    sync: SyncCoordinator,
}

impl Session {
    /// Connect over WebSocket and talk to the REST API with reqwest
    pub fn connect(config: Config) -> SyncResult<Self> {
        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemote::new(config.clone())?);
        Self::start(&config, Arc::new(WebSocketTransport::new()), remote)
    }

    /// Assemble a session over any transport and remote store
    pub fn start(config: &Config, transport: Arc<dyn Transport>, remote: Arc<dyn RemoteStore>) -> SyncResult<Self> {
        let user_id = config
            .user_id()
            .ok_or_else(|| config_error(ConfigError::MissingValue("user_id")))?;
        let options = ConnectOptions::from_config(config).map_err(config_error)?;

        let bus = EventBus::new();
        let (connection, events) = ChannelConnection::new(transport, options).open();
        let router = TopicRouter::new(connection.clone(), events);
        let workspace = NotesWorkspace::new(remote, config.app().save_debounce(), bus.clone());
        let arrivals = NewArrivals::new(config.app().arrival_highlight(), bus.clone());
        let sync = SyncCoordinator::new(router, workspace, arrivals);
        sync.start(config.app().sidebar_destination_for(user_id));
        tracing::info!("session started for user {}", user_id);

        Ok(Self { bus, connection, sync })
    }

    pub fn events(&self) -> &EventBus<SyncEvent> {
        &self.bus
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn workspace(&self) -> &NotesWorkspace {
        self.sync.workspace()
    }

    /// Flush pending saves, then tear everything down
    pub async fn close(self) -> SyncResult<()> {
        let flushed = self.workspace().saves().flush_all().await;
        self.sync.shutdown();
        self.sync.router().shutdown();
        tracing::info!("session closed");
        flushed
    }
}

fn config_error(error: ConfigError) -> SyncError {
    SyncError::validation("config", error.to_string())
}
