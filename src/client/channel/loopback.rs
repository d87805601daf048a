//! In-process transport for tests and embedding.
//!
//! [`LoopbackTransport::new`] returns the client-side transport plus a
//! [`LoopbackServer`] that accepts each opened pipe as a [`LoopbackPeer`]
//! speaking raw STOMP text.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use super::frame::{Command, Frame};
use super::transport::{OpenRequest, Transport, TransportLink};
use crate::shared::error::{SyncError, SyncResult};

#[derive(Default)]
struct LoopbackState {
    scripted_failures: VecDeque<SyncError>,
    attempts: usize,
    requests: Vec<OpenRequest>,
}

/// Client side of the loopback pipe
#[derive(Clone)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
    peers: mpsc::UnboundedSender<LoopbackPeer>,
}

/// Accepts pipes opened through the paired [`LoopbackTransport`]
pub struct LoopbackServer {
    state: Arc<Mutex<LoopbackState>>,
    peers: mpsc::UnboundedReceiver<LoopbackPeer>,
}

/// Server end of one opened pipe
#[derive(Debug)]
pub struct LoopbackPeer {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
    pub request: OpenRequest,
}

impl LoopbackTransport {
    pub fn new() -> (Self, LoopbackServer) {
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: state.clone(),
                peers: peer_tx,
            },
            LoopbackServer {
                state,
                peers: peer_rx,
            },
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for LoopbackTransport {
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, SyncResult<TransportLink>> {
        Box::pin(async move {
            let scripted = {
                let mut state = self.lock();
                state.attempts += 1;
                state.requests.push(request.clone());
                state.scripted_failures.pop_front()
            };
            if let Some(err) = scripted {
                return Err(err);
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let peer = LoopbackPeer {
                to_client: Some(in_tx),
                from_client: out_rx,
                request,
            };
            self.peers
                .send(peer)
                .map_err(|_| SyncError::transport("loopback server dropped"))?;
            Ok(TransportLink {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}

impl LoopbackServer {
    /// Wait for the client to open the next pipe
    pub async fn accept(&mut self) -> Option<LoopbackPeer> {
        self.peers.recv().await
    }

    /// Make the next `open` fail with `err` instead of producing a peer
    pub fn fail_next(&self, err: SyncError) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.scripted_failures.push_back(err);
    }

    /// Total `open` calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .attempts
    }
}

impl LoopbackPeer {
    /// Next non-heart-beat frame sent by the client; `None` once the client hung up
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        while let Some(text) = self.from_client.recv().await {
            match Frame::parse(&text) {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => continue,
                Err(e) => tracing::warn!("loopback peer got malformed frame: {}", e),
            }
        }
        None
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.send_raw(frame.encode())
    }

    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Expect CONNECT, reply CONNECTED, and return the CONNECT frame
    pub async fn accept_connect(&mut self) -> Option<Frame> {
        let frame = self.recv_frame().await?;
        if frame.command != Command::Connect {
            return None;
        }
        self.send_frame(&Frame::new(Command::Connected).header("version", "1.2"));
        Some(frame)
    }

    /// Expect CONNECT and refuse it with an ERROR frame
    pub async fn reject_connect(&mut self, message: &str) -> Option<Frame> {
        let frame = self.recv_frame().await?;
        self.send_frame(&Frame::new(Command::Error).header("message", message));
        Some(frame)
    }

    /// Push a MESSAGE frame for a subscription id
    pub fn deliver(&self, subscription: &str, destination: &str, body: &str) -> bool {
        let frame = Frame::new(Command::Message)
            .header("subscription", subscription)
            .header("destination", destination)
            .header("message-id", uuid::Uuid::new_v4().to_string())
            .with_body(body);
        self.send_frame(&frame)
    }

    /// Drop the server side of the pipe, as if the socket died
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}
