//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;

/// Optional query parameters accepted by the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Logical user to bind the connection to; enables user-targeted
    /// multicast and principal resolution for this connection.
    pub user: Option<String>,
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state, query.user))
}
