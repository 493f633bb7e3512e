//! WebSocket connection loop.
//!
//! Runs the read/write loop for a single connection: inbound frames are
//! dispatched to the hub in delivery order (calls for one connection never
//! overlap), outbound frames are drained from the connection's queue, and
//! a closed socket tears the connection down through the hub's disconnect
//! path.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::app_state::AppState;
use crate::domain::{ConnectionId, WirePayload};
use crate::service::HubDispatcher;

use super::messages::ClientFrame;

/// Runs the read/write loop for a single WebSocket connection.
pub async fn run_connection(socket: WebSocket, state: AppState, user: Option<String>) {
    let connection_id = ConnectionId::new(uuid::Uuid::new_v4().to_string());
    let mut outbound = state.transport.register(&connection_id, user);
    let (mut ws_tx, mut ws_rx) = socket.split();

    tracing::info!(%connection_id, "ws connection opened");

    loop {
        tokio::select! {
            // Incoming frame from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(&state.dispatcher, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Outbound frame queued by the transport
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        let Ok(json) = serde_json::to_string(&frame) else {
                            continue;
                        };
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.transport.unregister(&connection_id);
    state.dispatcher.handle_disconnect(&connection_id).await;
    tracing::debug!(%connection_id, "ws connection closed");
}

/// Decodes one inbound frame and hands it to the dispatcher. Frames that
/// fail to decode are dropped with a log line; the connection stays up.
async fn dispatch_frame(dispatcher: &HubDispatcher, connection_id: &ConnectionId, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::RequestView { vm_id, arg }) => {
            dispatcher
                .request_view(connection_id, &vm_id, WirePayload::Tree(arg))
                .await;
        }
        Ok(ClientFrame::UpdateView { vm_id, patch }) => {
            let patch = patch
                .into_iter()
                .map(|(key, value)| (key, WirePayload::Tree(value)))
                .collect();
            dispatcher.update_view(connection_id, &vm_id, patch).await;
        }
        Ok(ClientFrame::DisposeView { vm_id }) => {
            dispatcher.dispose_view(connection_id, &vm_id).await;
        }
        Err(err) => {
            tracing::warn!(%connection_id, error = %err, "undecodable frame dropped");
        }
    }
}
