//! One client connection: a reader task feeding the hub and a writer task
//! draining the ordered outbound queue to the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::Duration;
use uuid::Uuid;

use crate::hub::{Hub, InboundFrame};
use crate::messages::InboundMessage;

/// Outbound queue depth per connection. Frames beyond this are
/// backpressure; the enqueue path blocks briefly and then gives up on the
/// connection entirely.
pub const OUTBOUND_BUFFER: usize = 256;
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cheap handle the hub keeps per connection: identity plus the sending
/// half of the outbound queue. Dropping the last clone closes the queue
/// and thereby stops the writer.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Encodes and enqueues one frame. Returns `false` only when the queue
    /// stayed full past the enqueue timeout, which the hub treats as a
    /// dead client.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> bool {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(connection_id = %self.id, error = %e, "failed to encode frame");
                return true;
            }
        };
        match self.outbound.send_timeout(text, ENQUEUE_TIMEOUT).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => false,
            // A closed queue means the connection is already unwinding.
            Err(SendTimeoutError::Closed(_)) => true,
        }
    }
}

/// Runs a freshly upgraded socket to completion: registers with the hub,
/// pumps frames both ways, and unregisters when either direction fails.
pub async fn serve(socket: WebSocket, hub: Arc<Hub>) {
    let connection_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

    // Registration completes (and CONNECTED is queued) before the first
    // client frame is read, so the welcome always leads on the wire.
    hub.register(ConnectionHandle::new(connection_id, outbound_tx))
        .await;
    tracing::info!(connection_id = %connection_id, "websocket connection established");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(connection_id, sink, outbound_rx));
    read_pump(connection_id, stream, &hub).await;

    hub.unregister(connection_id).await;
    let _ = writer.await;
    tracing::info!(connection_id = %connection_id, "websocket connection closed");
}

async fn read_pump(connection_id: Uuid, mut stream: SplitStream<WebSocket>, hub: &Arc<Hub>) {
    let inbound = hub.inbound_sender();
    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(message) => {
                    if inbound
                        .send(InboundFrame {
                            connection_id,
                            message,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "dropping unparsable frame"
                    );
                }
            },
            Message::Close(_) => break,
            // Binary and control frames are ignored.
            _ => {}
        }
    }
}

async fn write_pump(
    connection_id: Uuid,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    while let Some(text) = outbound_rx.recv().await {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            tracing::debug!(connection_id = %connection_id, error = %e, "write error");
            break;
        }
    }
    let _ = sink.close().await;
}
