//! Byte-pipe seam under the STOMP connection.
//!
//! A [`Transport`] opens one text-message pipe per connection attempt. The
//! connection supervisor only sees a [`TransportLink`]: an outgoing sender and
//! an incoming receiver. The link is closed when the incoming side ends.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::shared::error::{SyncError, SyncResult};

/// Parameters for one connection attempt
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub url: String,
    pub token: Option<String>,
}

/// An open text pipe
#[derive(Debug)]
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Opens text pipes to the push server.
pub trait Transport: Send + Sync + 'static {
    /// Open a pipe. HTTP 401/403 on upgrade must map to [`SyncError::AuthRejected`].
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, SyncResult<TransportLink>>;
}

/// Production transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, SyncResult<TransportLink>> {
        Box::pin(async move {
            let mut ws_request = request
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| SyncError::transport(format!("invalid websocket url: {}", e)))?;
            if let Some(token) = &request.token {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SyncError::validation("token", e.to_string()))?;
                ws_request.headers_mut().insert("Authorization", value);
            }

            let (stream, _) = tokio_tungstenite::connect_async(ws_request)
                .await
                .map_err(map_connect_error)?;
            tracing::debug!("websocket open: {}", request.url);

            let (mut writer, mut reader) = stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

            // Writer task: forward outgoing channel to WebSocket
            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if let Err(e) = writer.send(Message::text(text)).await {
                        tracing::debug!("websocket write failed: {}", e);
                        break;
                    }
                }
                let _ = writer.close().await;
            });

            // Reader task: forward text messages until close
            tokio::spawn(async move {
                while let Some(message) = reader.next().await {
                    let text = match message {
                        Ok(Message::Text(text)) => text.as_str().to_owned(),
                        Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                        Ok(Message::Close(frame)) => {
                            tracing::debug!("websocket closed by peer: {:?}", frame);
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("websocket read failed: {}", e);
                            break;
                        }
                    };
                    if in_tx.send(text).is_err() {
                        break;
                    }
                }
            });

            Ok(TransportLink {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}

fn map_connect_error(err: WsError) -> SyncError {
    match err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                SyncError::auth_rejected(format!("upgrade rejected with HTTP {}", status))
            } else {
                SyncError::transport(format!("upgrade failed with HTTP {}", status))
            }
        }
        other => SyncError::transport(other.to_string()),
    }
}
