//! Socket transport abstraction.
//!
//! The connection manager talks to a `Transport` rather than a concrete
//! socket so tests can drive it with a channel-backed fake. A live
//! connection is a pair of channels: writing to `outbound` sends a text
//! frame, dropping `outbound` closes the socket, and the `inbound` stream
//! ending means the socket is gone.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use tm_core::error::{TmError, TmResult};

/// Events surfaced by a live connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The socket closed (remote close, error, or local shutdown).
    Closed {
        /// Best-effort close reason for logging.
        reason: String,
    },
}

/// A live duplex connection.
pub struct Connection {
    /// Send a serialized frame. Errors mean the socket is gone.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound frames and the terminal close event.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens connections. Implemented by the WebSocket transport in
/// production and by channel-backed fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> TmResult<Connection>;
}

/// `tokio-tungstenite` WebSocket transport.
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> TmResult<Connection> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TmError::Socket(format!("connect to {url} failed: {e}")))?;
        debug!("websocket open: {url}");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Writer: drains the outbound channel into the sink. The channel
        // closing is the local shutdown signal.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!("websocket write failed: {e}");
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        // Reader: forwards text frames until the stream ends.
        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(TransportEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed { reason });
                        return;
                    }
                    // Protocol ping/pong and binary frames are not part of
                    // the application protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = inbound_tx.send(TransportEvent::Closed {
                            reason: e.to_string(),
                        });
                        return;
                    }
                    None => {
                        let _ = inbound_tx.send(TransportEvent::Closed {
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                }
            }
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
