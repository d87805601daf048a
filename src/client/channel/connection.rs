//! Push connection lifecycle.
//!
//! [`ChannelConnection::open`] spawns a supervisor task that owns the
//! transport: it connects, performs the STOMP handshake, pumps inbound frames
//! into a [`ConnectionEvents`] channel and reconnects with exponential backoff
//! until it is closed or the server rejects the credentials.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::backoff::Backoff;
use super::frame::{Command, Frame};
use super::transport::{OpenRequest, Transport, TransportLink};
use crate::client::config::Config;
use crate::shared::config::ConfigError;
use crate::shared::error::{SyncError, SyncResult};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Closed by the caller or after a terminal auth failure; no more attempts
    Closed,
}

/// Events emitted by the connection, in transport order.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// STOMP session established
    Connected,
    /// Session lost; every subscription is invalid until the next `Connected`
    Disconnected,
    /// Failed attempt, server ERROR frame or malformed input
    Error(SyncError),
    /// Inbound frame other than CONNECTED/ERROR
    Frame(Frame),
}

pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Credentials and tuning for one logical connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub token: Option<String>,
    pub host: String,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let host = host_of(&url);
        Self {
            url,
            token: None,
            host,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_max = max;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut options = Self::new(config.ws_url()?)
            .with_backoff(config.app().reconnect_base(), config.app().reconnect_max());
        options.token = config.get_token().cloned();
        Ok(options)
    }
}

fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.split(':').next().unwrap_or(authority).to_string()
}

struct Shared {
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn outgoing(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outgoing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn fail_terminal(&self, err: SyncError) {
        tracing::error!("push connection closed permanently: {}", err);
        self.outgoing().take();
        self.set_state(ConnectionState::Closed);
        self.emit(ConnectionEvent::Error(err));
    }
}

/// Cloneable handle to the shared connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

/// One logical push connection per session
pub struct ChannelConnection {
    transport: Arc<dyn Transport>,
    options: ConnectOptions,
}

impl ChannelConnection {
    pub fn new(transport: Arc<dyn Transport>, options: ConnectOptions) -> Self {
        Self { transport, options }
    }

    /// Start connecting in the background
    pub fn open(self) -> (ConnectionHandle, ConnectionEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            outgoing: Mutex::new(None),
            state: state_tx,
            events: events_tx,
            supervisor: Mutex::new(None),
        });

        let task = tokio::spawn(supervise(self.transport, self.options, shared.clone()));
        *shared
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);

        (ConnectionHandle { shared }, events_rx)
    }
}

impl ConnectionHandle {
    /// Queue a frame on the live session
    pub fn send(&self, frame: &Frame) -> SyncResult<()> {
        let outgoing = self.shared.outgoing();
        let sender = outgoing
            .as_ref()
            .ok_or_else(|| SyncError::transport("not connected"))?;
        tracing::debug!("-> {} {:?}", frame.command, frame.get_header("destination"));
        sender
            .send(frame.encode())
            .map_err(|_| SyncError::transport("connection closed"))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Send DISCONNECT if connected and stop reconnecting
    pub fn disconnect(&self) {
        if let Some(outgoing) = self.shared.outgoing().take() {
            let _ = outgoing.send(Frame::disconnect().encode());
        }
        let task = self
            .shared
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        let previous = self.shared.state.send_replace(ConnectionState::Closed);
        if previous != ConnectionState::Closed {
            tracing::info!("push connection closed by client");
            self.shared.emit(ConnectionEvent::Disconnected);
        }
    }
}

enum Handshake {
    /// Carries frames that arrived in the same message after CONNECTED
    Accepted(Vec<SyncResult<Frame>>),
    Refused(String),
    Dropped,
}

async fn await_connected(incoming: &mut mpsc::UnboundedReceiver<String>) -> Handshake {
    while let Some(text) = incoming.recv().await {
        let mut frames = Frame::parse_all(&text).into_iter();
        while let Some(parsed) = frames.next() {
            match parsed {
                Ok(frame) if frame.command == Command::Connected => {
                    return Handshake::Accepted(frames.by_ref().collect());
                }
                Ok(frame) if frame.command == Command::Error => {
                    let message = frame
                        .get_header("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    return Handshake::Refused(message);
                }
                Ok(frame) => tracing::debug!("ignoring {} before CONNECTED", frame.command),
                Err(e) => tracing::warn!("malformed frame during handshake: {}", e),
            }
        }
    }
    Handshake::Dropped
}

fn dispatch(shared: &Shared, parsed: SyncResult<Frame>) {
    match parsed {
        Ok(frame) if frame.command == Command::Error => {
            let message = frame.get_header("message").unwrap_or("server error").to_string();
            tracing::warn!("server sent ERROR frame: {}", message);
            shared.emit(ConnectionEvent::Error(SyncError::transport(message)));
        }
        Ok(frame) => {
            tracing::debug!("<- {} {:?}", frame.command, frame.get_header("destination"));
            shared.emit(ConnectionEvent::Frame(frame));
        }
        Err(e) => {
            tracing::warn!("dropping malformed frame: {}", e);
            shared.emit(ConnectionEvent::Error(e));
        }
    }
}

async fn supervise(transport: Arc<dyn Transport>, options: ConnectOptions, shared: Arc<Shared>) {
    let mut backoff = Backoff::new(options.reconnect_base, options.reconnect_max);
    let mut first_attempt = true;

    loop {
        shared.set_state(if first_attempt {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });
        first_attempt = false;

        let request = OpenRequest {
            url: options.url.clone(),
            token: options.token.clone(),
        };
        let TransportLink { outgoing, mut incoming } = match transport.open(request).await {
            Ok(link) => link,
            Err(e) if e.is_terminal() => {
                shared.fail_terminal(e);
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!("push connection attempt failed (retry in {:?}): {}", delay, e);
                shared.emit(ConnectionEvent::Error(e));
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let connect = Frame::connect(&options.host, options.token.as_deref());
        let handshake = if outgoing.send(connect.encode()).is_ok() {
            await_connected(&mut incoming).await
        } else {
            Handshake::Dropped
        };
        let early = match handshake {
            Handshake::Accepted(early) => early,
            Handshake::Refused(message) => {
                shared.fail_terminal(SyncError::auth_rejected(message));
                return;
            }
            Handshake::Dropped => {
                let delay = backoff.next_delay();
                tracing::warn!("connection dropped during STOMP handshake (retry in {:?})", delay);
                shared.emit(ConnectionEvent::Error(SyncError::transport(
                    "connection closed during STOMP handshake",
                )));
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        backoff.reset();
        *shared.outgoing() = Some(outgoing);
        shared.set_state(ConnectionState::Connected);
        tracing::info!("push connection established: {}", options.url);
        shared.emit(ConnectionEvent::Connected);
        for parsed in early {
            dispatch(&shared, parsed);
        }

        while let Some(text) = incoming.recv().await {
            for parsed in Frame::parse_all(&text) {
                dispatch(&shared, parsed);
            }
        }

        shared.outgoing().take();
        shared.set_state(ConnectionState::Disconnected);
        shared.emit(ConnectionEvent::Disconnected);

        let delay = backoff.next_delay();
        tracing::warn!("push connection lost, reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
