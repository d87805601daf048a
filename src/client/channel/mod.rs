//! Push channel: STOMP framing, transports and the supervised connection.

pub mod backoff;
pub mod connection;
pub mod frame;
pub mod loopback;
pub mod transport;

pub use backoff::Backoff;
pub use connection::{
    ChannelConnection, ConnectOptions, ConnectionEvent, ConnectionEvents, ConnectionHandle,
    ConnectionState,
};
pub use frame::{Command, Frame};
pub use loopback::{LoopbackPeer, LoopbackServer, LoopbackTransport};
pub use transport::{OpenRequest, Transport, TransportLink, WebSocketTransport};
