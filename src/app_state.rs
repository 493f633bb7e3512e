//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::HubDispatcher;
use crate::ws::transport::WsTransport;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hub dispatcher driving every inbound call.
    pub dispatcher: Arc<HubDispatcher>,
    /// Connection/group/user tables behind the WebSocket endpoint.
    pub transport: Arc<WsTransport>,
}
