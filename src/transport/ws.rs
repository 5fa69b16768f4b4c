//! WebSocket client transport

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{ChannelTransport, Outbound, ServerEvent};
use crate::Result;

/// Live connection to the bridge
///
/// Writes and reads run on their own tasks. Dropping the connection stops
/// both at once; [`Connection::close`] lets queued messages go out first.
pub struct Connection {
    transport: ChannelTransport,
    events: mpsc::Receiver<ServerEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Fire-and-forget sender for outbound messages
    #[must_use]
    pub fn transport(&self) -> ChannelTransport {
        self.transport.clone()
    }

    /// Wait for the next server event; `None` once the socket is gone
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Send everything already queued, then close the socket
    ///
    /// Messages queued after this call are rejected. If the writer has not
    /// finished within `timeout` the rest of the queue is dropped.
    pub async fn close(mut self, timeout: Duration) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(timeout, &mut self.writer).await.is_err() {
            tracing::warn!(?timeout, "outbound queue not flushed before close");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

/// Connect to a bridge endpoint
///
/// `capacity` bounds both the outbound queue and the inbound event queue.
///
/// # Errors
///
/// Returns error if the WebSocket handshake fails
pub async fn connect(url: &str, capacity: usize) -> Result<Connection> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    tracing::info!(url, "connected to voice backend");

    let (transport, mut outbound) = ChannelTransport::new(capacity);
    let (events_tx, events) = mpsc::channel(capacity.max(1));
    let (shutdown, mut shutdown_rx) = oneshot::channel();

    let writer = tokio::spawn(async move {
        let mut closing = false;
        loop {
            let msg = tokio::select! {
                biased;
                msg = outbound.recv() => msg,
                _ = &mut shutdown_rx, if !closing => {
                    // Stop accepting sends but drain what is queued
                    closing = true;
                    outbound.close();
                    continue;
                }
            };
            let Some(msg) = msg else { break };
            let kind = msg.kind();
            let message = match msg.into_message() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, kind, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sink.send(message).await {
                tracing::warn!(error = %e, kind, "websocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
        tracing::debug!("websocket writer stopped");
    });

    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unrecognized server message");
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("voice backend closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "websocket receive failed");
                    break;
                }
            }
        }
    });

    Ok(Connection {
        transport,
        events,
        shutdown: Some(shutdown),
        writer,
        reader,
    })
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

