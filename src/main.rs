//! pulse-hub server entry point.
//!
//! Starts the Axum server with the WebSocket hub endpoint, wiring a demo
//! echo controller behind the dispatcher. Host applications embed the
//! library crate and supply their own controller factory instead.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::routing::get;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pulse_hub::api;
use pulse_hub::app_state::AppState;
use pulse_hub::config::HubConfig;
use pulse_hub::domain::{
    ConnectionId, ControllerFactory, ControllerRegistry, ViewModelController,
};
use pulse_hub::error::HubError;
use pulse_hub::pipeline::MiddlewarePipeline;
use pulse_hub::service::{
    HubDispatcher, HubTransport, MulticastRouter, PrincipalResolver,
};
use pulse_hub::ws::handler::ws_handler;
use pulse_hub::ws::transport::WsTransport;

/// Demo controller: echoes request arguments back through a per-view-model
/// broadcast group so multiple clients of one view model see each other's
/// requests land.
struct EchoController;

#[async_trait]
impl ViewModelController for EchoController {
    async fn on_request(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &Value,
    ) -> Result<Option<String>, HubError> {
        tracing::info!(%connection_id, vm_id, payload = %data, "echo request");
        Ok(Some(format!("vm:{vm_id}")))
    }

    async fn on_update(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &Value,
    ) -> Result<(), HubError> {
        tracing::info!(%connection_id, vm_id, payload = %data, "echo update");
        Ok(())
    }

    async fn on_dispose(&self, connection_id: &ConnectionId, vm_id: &str) -> Result<(), HubError> {
        tracing::info!(%connection_id, vm_id, "echo dispose");
        Ok(())
    }
}

struct EchoControllerFactory;

impl ControllerFactory for EchoControllerFactory {
    fn create(&self, _connection_id: &ConnectionId) -> Arc<dyn ViewModelController> {
        Arc::new(EchoController)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = HubConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting pulse-hub");

    // Build the hub
    let transport = Arc::new(WsTransport::new());
    let transport_obj: Arc<dyn HubTransport> = transport.clone();
    let resolver: Arc<dyn PrincipalResolver> = transport.clone();
    let registry = Arc::new(ControllerRegistry::new(Arc::new(EchoControllerFactory)));
    let router = Arc::new(MulticastRouter::new(
        Arc::clone(&transport_obj),
        Arc::clone(&registry),
    ));
    let pipeline = Arc::new(MiddlewarePipeline::new());
    let dispatcher = Arc::new(HubDispatcher::new(
        Arc::clone(&registry),
        pipeline,
        router,
        transport_obj,
        Some(resolver),
    ));

    // Evict controllers whose connections went quiet without a clean close
    if let Some(max_idle) = config.controller_idle_timeout() {
        let registry = Arc::clone(&registry);
        let interval = std::time::Duration::from_secs(config.controller_sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = registry.sweep_idle(max_idle);
                if !evicted.is_empty() {
                    tracing::info!(count = evicted.len(), "idle controllers evicted");
                }
            }
        });
    }

    // Build application state
    let app_state = AppState {
        dispatcher,
        transport,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
