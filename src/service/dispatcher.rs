//! The hub dispatcher: inbound operations, pipeline sequencing, and
//! response delivery.
//!
//! Every inbound call follows the same path: build a fresh per-call
//! context, normalize the payload, run the interceptor pipeline around the
//! resolved controller, then deliver side effects. A failed call makes at
//! most one error push to its originating connection; a cancelled call
//! makes none.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{
    ConnectionId, ControllerRegistry, MulticastEnvelope, Operation, RequestContext,
    ViewModelController, WirePayload, payload,
};
use crate::error::HubError;
use crate::pipeline::{FilterStage, MiddlewarePipeline, PipelineResult, endpoint};

use super::multicast::{MULTICAST_MARKER, MulticastRouter};
use super::transport::{HubTransport, PrincipalResolver};

/// Which controller hook an inbound call terminates on.
#[derive(Clone, Copy)]
enum CallKind {
    Request,
    Update,
    Dispose,
}

/// Top-level orchestrator mediating between the transport and the
/// per-connection controllers.
pub struct HubDispatcher {
    registry: Arc<ControllerRegistry>,
    pipeline: Arc<MiddlewarePipeline>,
    router: Arc<MulticastRouter>,
    transport: Arc<dyn HubTransport>,
    principal_resolver: Option<Arc<dyn PrincipalResolver>>,
}

impl HubDispatcher {
    /// Wires a dispatcher from its collaborators. `principal_resolver` is
    /// an optional capability; pass `None` for transports with no identity
    /// concept.
    #[must_use]
    pub fn new(
        registry: Arc<ControllerRegistry>,
        pipeline: Arc<MiddlewarePipeline>,
        router: Arc<MulticastRouter>,
        transport: Arc<dyn HubTransport>,
        principal_resolver: Option<Arc<dyn PrincipalResolver>>,
    ) -> Self {
        Self {
            registry,
            pipeline,
            router,
            transport,
            principal_resolver,
        }
    }

    /// Returns the controller registry this dispatcher resolves against.
    #[must_use]
    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    fn make_context(
        &self,
        connection_id: &ConnectionId,
        operation: Operation,
        vm_id: &str,
    ) -> RequestContext {
        let principal = self
            .principal_resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(connection_id));
        RequestContext::new(connection_id.clone(), operation, vm_id, principal)
    }

    /// Handles a view-model request from a client.
    ///
    /// The controller is created on demand for the connection. A non-empty
    /// group name returned by the handler joins the connection to that
    /// group. Failures are reported to the originating connection unless
    /// cancelled or suppressed.
    pub async fn request_view(&self, connection_id: &ConnectionId, vm_id: &str, arg: WirePayload) {
        let mut ctx = self.make_context(connection_id, Operation::RequestView, vm_id);
        let controller = self.registry.get_or_create(connection_id);

        match arg.normalize() {
            Ok(normalized) => ctx.payload = normalized,
            Err(err) => {
                self.fail(&ctx, err, true).await;
                return;
            }
        }

        let error_ctx = ctx.clone();
        match self
            .invoke(ctx, controller, Some(FilterStage::Request), CallKind::Request)
            .await
        {
            Ok(Some(group_name)) if !group_name.is_empty() => {
                self.router.join_group(connection_id, &group_name).await;
                tracing::debug!(%connection_id, vm_id, group = %group_name, "request served, group joined");
            }
            Ok(_) => {
                tracing::debug!(%connection_id, vm_id, "request served");
            }
            Err(err) => self.fail(&error_ctx, err, true).await,
        }
    }

    /// Deprecated name for [`HubDispatcher::request_view`].
    #[deprecated(since = "0.1.0", note = "use `request_view`")]
    pub async fn request_vm(&self, connection_id: &ConnectionId, vm_id: &str, arg: WirePayload) {
        self.request_view(connection_id, vm_id, arg).await;
    }

    /// Applies a property patch to a view model.
    ///
    /// Each patch value is normalized independently before the pipeline
    /// runs. No group side effect. Failures are reported to the
    /// originating connection unless cancelled or suppressed.
    pub async fn update_view(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        patch: Vec<(String, WirePayload)>,
    ) {
        let mut ctx = self.make_context(connection_id, Operation::UpdateView, vm_id);
        let controller = self.registry.get_or_create(connection_id);

        match payload::normalize_fields(patch) {
            Ok(normalized) => ctx.payload = normalized,
            Err(err) => {
                self.fail(&ctx, err, true).await;
                return;
            }
        }

        let error_ctx = ctx.clone();
        match self
            .invoke(ctx, controller, Some(FilterStage::Update), CallKind::Update)
            .await
        {
            Ok(_) => {
                tracing::debug!(%connection_id, vm_id, "update applied");
            }
            Err(err) => self.fail(&error_ctx, err, true).await,
        }
    }

    /// Deprecated name for [`HubDispatcher::update_view`].
    #[deprecated(since = "0.1.0", note = "use `update_view`")]
    pub async fn update_vm(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        patch: Vec<(String, WirePayload)>,
    ) {
        self.update_view(connection_id, vm_id, patch).await;
    }

    /// Releases a view model. Best-effort: failures reach the exception
    /// stage for observation but are never forwarded to the client.
    pub async fn dispose_view(&self, connection_id: &ConnectionId, vm_id: &str) {
        let ctx = self.make_context(connection_id, Operation::DisposeView, vm_id);
        let controller = self.registry.get_or_create(connection_id);

        let error_ctx = ctx.clone();
        match self
            .invoke(ctx, controller, None, CallKind::Dispose)
            .await
        {
            Ok(_) => {
                tracing::debug!(%connection_id, vm_id, "view disposed");
            }
            Err(err) => self.fail(&error_ctx, err, false).await,
        }
    }

    /// Deprecated name for [`HubDispatcher::dispose_view`].
    #[deprecated(since = "0.1.0", note = "use `dispose_view`")]
    pub async fn dispose_vm(&self, connection_id: &ConnectionId, vm_id: &str) {
        self.dispose_view(connection_id, vm_id).await;
    }

    /// Tears down a disconnected connection.
    ///
    /// The controller is removed from the registry before the disconnect
    /// hooks run; removal is idempotent, and the hooks run to completion
    /// regardless of cancellation elsewhere.
    pub async fn handle_disconnect(&self, connection_id: &ConnectionId) {
        let ctx = self.make_context(connection_id, Operation::Disconnect, "");
        let removed = self.registry.remove(connection_id);
        tracing::info!(%connection_id, removed, "connection disconnected");
        self.pipeline.run_disconnection_middlewares(&ctx).await;
    }

    /// Deprecated name for [`HubDispatcher::handle_disconnect`].
    #[deprecated(since = "0.1.0", note = "use `handle_disconnect`")]
    pub async fn on_disconnected(&self, connection_id: &ConnectionId) {
        self.handle_disconnect(connection_id).await;
    }

    /// Delivers a serialized response.
    ///
    /// A destination carrying [`MULTICAST_MARKER`] holds a
    /// [`MulticastEnvelope`] in `serialized_data` and is delegated to the
    /// router. Otherwise the destination is a single connection: the push
    /// happens only while its controller is live (the lookup refreshes the
    /// controller's keepalive), wrapped in the pre-response filter stage.
    /// Push-path failures are logged, never reported back to anyone.
    pub async fn push_response(&self, destination_id: &str, vm_id: &str, serialized_data: &str) {
        if destination_id.starts_with(MULTICAST_MARKER) {
            match serde_json::from_str::<MulticastEnvelope>(serialized_data) {
                Ok(envelope) => self.router.route(envelope, vm_id).await,
                Err(err) => {
                    tracing::warn!(vm_id, error = %err, "undecodable multicast envelope dropped");
                }
            }
            return;
        }

        let connection_id = ConnectionId::new(destination_id);
        let Some(controller) = self.registry.get(&connection_id) else {
            tracing::debug!(%connection_id, vm_id, "push dropped, no live controller");
            return;
        };

        let mut ctx = self.make_context(&connection_id, Operation::Response, vm_id);
        ctx.payload = Value::String(serialized_data.to_string());

        let send = {
            let transport = Arc::clone(&self.transport);
            endpoint(move |ctx: RequestContext| {
                let transport = Arc::clone(&transport);
                async move {
                    // Filters may have rewritten the outgoing payload.
                    let data = match &ctx.payload {
                        Value::String(data) => data.clone(),
                        other => other.to_string(),
                    };
                    transport
                        .send_to_connection(&ctx.connection_id, &ctx.vm_id, &data)
                        .await
                        .map(|()| None)
                }
            })
        };

        if let Err(err) = self
            .pipeline
            .run_vm_filters(FilterStage::Response, ctx, controller, &send)
            .await
        {
            tracing::warn!(%connection_id, vm_id, error = %err, "response push failed");
        }
    }

    /// Runs the general middleware chain around the view-model filter
    /// chain (when `stage` names one) around the controller hook for
    /// `kind`. Dispose has no filter hook point, so it passes `None`.
    async fn invoke(
        &self,
        ctx: RequestContext,
        controller: Arc<dyn ViewModelController>,
        stage: Option<FilterStage>,
        kind: CallKind,
    ) -> PipelineResult {
        let inner = {
            let controller = Arc::clone(&controller);
            endpoint(move |ctx: RequestContext| {
                let controller = Arc::clone(&controller);
                async move {
                    match kind {
                        CallKind::Request => {
                            controller
                                .on_request(&ctx.connection_id, &ctx.vm_id, &ctx.payload)
                                .await
                        }
                        CallKind::Update => controller
                            .on_update(&ctx.connection_id, &ctx.vm_id, &ctx.payload)
                            .await
                            .map(|()| None),
                        CallKind::Dispose => controller
                            .on_dispose(&ctx.connection_id, &ctx.vm_id)
                            .await
                            .map(|()| None),
                    }
                }
            })
        };

        let chain = match stage {
            Some(stage) => {
                let pipeline = Arc::clone(&self.pipeline);
                endpoint(move |ctx: RequestContext| {
                    let pipeline = Arc::clone(&pipeline);
                    let controller = Arc::clone(&controller);
                    let inner = Arc::clone(&inner);
                    async move { pipeline.run_vm_filters(stage, ctx, controller, &inner).await }
                })
            }
            None => inner,
        };

        self.pipeline.run_middlewares(ctx, &chain).await
    }

    /// Single exit for failed calls: suppress cancellations outright, give
    /// the exception stage its chance, then report at most one envelope to
    /// the originating connection when `report` allows it.
    async fn fail(&self, ctx: &RequestContext, err: HubError, report: bool) {
        if err.is_cancellation() {
            tracing::debug!(
                connection_id = %ctx.connection_id,
                operation = ctx.operation.as_str(),
                "call cancelled"
            );
            return;
        }

        tracing::warn!(
            connection_id = %ctx.connection_id,
            operation = ctx.operation.as_str(),
            vm_id = %ctx.vm_id,
            error = %err,
            "call failed"
        );

        let resolved = self.pipeline.run_exception_middleware(ctx, err).await;
        if !report {
            return;
        }
        let Some(final_err) = resolved else {
            return;
        };

        let Ok(data) = serde_json::to_string(&final_err.to_envelope()) else {
            tracing::error!(connection_id = %ctx.connection_id, "error envelope serialization failed");
            return;
        };
        self.push_response(ctx.connection_id.as_str(), &ctx.vm_id, &data)
            .await;
    }
}

impl fmt::Debug for HubDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubDispatcher")
            .field("registry", &self.registry)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::registry::tests::CountingFactory;
    use crate::domain::{ControllerFactory, Principal, SendEnvelope};
    use crate::error::ErrorEnvelope;
    use crate::pipeline::{
        DisconnectionMiddleware, ErrorDisposition, ExceptionMiddleware, Next, RequestMiddleware,
    };
    use crate::service::multicast::tests::RecordingTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Controller whose hook results are fixed up front; records every
    /// payload it is handed.
    struct ScriptedController {
        group: Option<String>,
        request_error: Option<HubError>,
        update_error: Option<HubError>,
        dispose_error: Option<HubError>,
        seen: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ViewModelController for ScriptedController {
        async fn on_request(
            &self,
            _connection_id: &ConnectionId,
            _vm_id: &str,
            data: &Value,
        ) -> Result<Option<String>, HubError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(("request".to_string(), data.clone()));
            }
            match &self.request_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.group.clone()),
            }
        }

        async fn on_update(
            &self,
            _connection_id: &ConnectionId,
            _vm_id: &str,
            data: &Value,
        ) -> Result<(), HubError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(("update".to_string(), data.clone()));
            }
            match &self.update_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn on_dispose(
            &self,
            _connection_id: &ConnectionId,
            _vm_id: &str,
        ) -> Result<(), HubError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(("dispose".to_string(), Value::Null));
            }
            match &self.dispose_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    /// Factory producing identically scripted controllers.
    #[derive(Default)]
    struct ScriptedFactory {
        group: Option<String>,
        request_error: Option<HubError>,
        update_error: Option<HubError>,
        dispose_error: Option<HubError>,
    }

    impl ControllerFactory for ScriptedFactory {
        fn create(&self, _connection_id: &ConnectionId) -> Arc<dyn ViewModelController> {
            Arc::new(ScriptedController {
                group: self.group.clone(),
                request_error: self.request_error.clone(),
                update_error: self.update_error.clone(),
                dispose_error: self.dispose_error.clone(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    /// Exception handler that records the errors it sees, forwarding
    /// them unchanged.
    struct ExceptionProbe {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ExceptionMiddleware for ExceptionProbe {
        async fn handle(&self, _ctx: &RequestContext, error: HubError) -> ErrorDisposition {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(error.kind().to_string());
            }
            ErrorDisposition::Forward(error)
        }
    }

    struct Harness {
        dispatcher: HubDispatcher,
        transport: Arc<RecordingTransport>,
        registry: Arc<ControllerRegistry>,
    }

    fn make_harness(factory: Arc<dyn ControllerFactory>, pipeline: MiddlewarePipeline) -> Harness {
        make_harness_with(factory, pipeline, None)
    }

    fn make_harness_with(
        factory: Arc<dyn ControllerFactory>,
        pipeline: MiddlewarePipeline,
        principal_resolver: Option<Arc<dyn PrincipalResolver>>,
    ) -> Harness {
        let transport = Arc::new(RecordingTransport::new());
        let registry = Arc::new(ControllerRegistry::new(factory));
        let transport_obj: Arc<dyn HubTransport> = transport.clone();
        let router = Arc::new(MulticastRouter::new(
            Arc::clone(&transport_obj),
            Arc::clone(&registry),
        ));
        let dispatcher = HubDispatcher::new(
            Arc::clone(&registry),
            Arc::new(pipeline),
            router,
            transport_obj,
            principal_resolver,
        );
        Harness {
            dispatcher,
            transport,
            registry,
        }
    }

    fn conn() -> ConnectionId {
        ConnectionId::new("conn-1")
    }

    #[tokio::test]
    async fn request_joins_returned_group_and_nothing_else() {
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                group: Some("room-1".to_string()),
                ..ScriptedFactory::default()
            }),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(json!({"page": 1})))
            .await;

        let joins = harness.transport.calls_named("add_to_group");
        assert_eq!(joins.len(), 1);
        let Some(join) = joins.first() else {
            panic!("missing join");
        };
        assert_eq!(join.1, "conn-1");
        assert_eq!(join.2, "room-1");
        assert!(harness.transport.calls_named("remove_from_group").is_empty());
    }

    #[tokio::test]
    async fn request_without_group_name_joins_nothing() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        assert!(harness.transport.calls_named("add_to_group").is_empty());
    }

    #[tokio::test]
    async fn empty_group_name_is_not_a_join() {
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                group: Some(String::new()),
                ..ScriptedFactory::default()
            }),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        assert!(harness.transport.calls_named("add_to_group").is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_request_pushes_nothing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register_exception_middleware(Arc::new(ExceptionProbe {
            seen: Arc::clone(&seen),
        }));
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                request_error: Some(HubError::Cancelled),
                ..ScriptedFactory::default()
            }),
            pipeline,
        );

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        assert!(harness.transport.calls_named("send_to_connection").is_empty());
        assert!(harness.transport.calls_named("add_to_group").is_empty());
        // Cancellations never even reach the exception stage.
        let Ok(seen) = seen.lock() else {
            panic!("seen lock poisoned");
        };
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_update_pushes_nothing() {
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                update_error: Some(HubError::Cancelled),
                ..ScriptedFactory::default()
            }),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .update_view(
                &conn(),
                "Counter",
                vec![("count".to_string(), WirePayload::Tree(json!(1)))],
            )
            .await;

        assert!(harness.transport.calls_named("send_to_connection").is_empty());
    }

    #[tokio::test]
    async fn failed_update_pushes_exactly_one_error_envelope() {
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                update_error: Some(HubError::Application("update exploded".to_string())),
                ..ScriptedFactory::default()
            }),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .update_view(
                &conn(),
                "Counter",
                vec![(
                    "count".to_string(),
                    WirePayload::Tree(json!("sensitive-patch-value")),
                )],
            )
            .await;

        let pushes = harness.transport.calls_named("send_to_connection");
        assert_eq!(pushes.len(), 1);
        let Some(push) = pushes.first() else {
            panic!("missing push");
        };
        assert_eq!(push.1, "conn-1");
        assert_eq!(push.2, "Counter");

        let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&push.3) else {
            panic!("push payload is not an error envelope: {}", push.3);
        };
        assert_eq!(envelope.kind, "application");
        assert!(!push.3.contains("sensitive-patch-value"));
    }

    #[tokio::test]
    async fn malformed_request_arg_reports_serialization_error() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Text("{broken".to_string()))
            .await;

        let pushes = harness.transport.calls_named("send_to_connection");
        assert_eq!(pushes.len(), 1);
        let Some(push) = pushes.first() else {
            panic!("missing push");
        };
        let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&push.3) else {
            panic!("expected error envelope");
        };
        assert_eq!(envelope.kind, "serialization");
    }

    #[tokio::test]
    async fn dispose_error_reaches_exception_stage_but_never_the_client() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register_exception_middleware(Arc::new(ExceptionProbe {
            seen: Arc::clone(&seen),
        }));
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                dispose_error: Some(HubError::Application("teardown failed".to_string())),
                ..ScriptedFactory::default()
            }),
            pipeline,
        );

        harness.dispatcher.dispose_view(&conn(), "Counter").await;

        assert!(harness.transport.calls_named("send_to_connection").is_empty());
        let Ok(seen) = seen.lock() else {
            panic!("seen lock poisoned");
        };
        assert_eq!(*seen, vec!["application".to_string()]);
    }

    #[tokio::test]
    async fn suppressed_error_pushes_nothing() {
        struct Silencer;

        #[async_trait]
        impl ExceptionMiddleware for Silencer {
            async fn handle(&self, _ctx: &RequestContext, _error: HubError) -> ErrorDisposition {
                ErrorDisposition::Suppress
            }
        }

        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register_exception_middleware(Arc::new(Silencer));
        let harness = make_harness(
            Arc::new(ScriptedFactory {
                update_error: Some(HubError::Application("boom".to_string())),
                ..ScriptedFactory::default()
            }),
            pipeline,
        );

        harness
            .dispatcher
            .update_view(
                &conn(),
                "Counter",
                vec![("count".to_string(), WirePayload::Tree(json!(1)))],
            )
            .await;

        assert!(harness.transport.calls_named("send_to_connection").is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_controller_then_runs_hooks() {
        /// Hook that records whether the controller was already gone.
        struct OrderProbe {
            registry: Mutex<Option<Arc<ControllerRegistry>>>,
            saw_removed: Arc<Mutex<Option<bool>>>,
        }

        #[async_trait]
        impl DisconnectionMiddleware for OrderProbe {
            async fn handle(&self, ctx: &RequestContext) -> Result<(), HubError> {
                let registry = match self.registry.lock() {
                    Ok(guard) => guard.clone(),
                    Err(_) => None,
                };
                if let (Some(registry), Ok(mut saw)) = (registry, self.saw_removed.lock()) {
                    *saw = Some(!registry.contains(&ctx.connection_id));
                }
                Ok(())
            }
        }

        let saw_removed = Arc::new(Mutex::new(None));
        let probe = Arc::new(OrderProbe {
            registry: Mutex::new(None),
            saw_removed: Arc::clone(&saw_removed),
        });
        let mut pipeline = MiddlewarePipeline::new();
        let probe_obj: Arc<dyn DisconnectionMiddleware> = probe.clone();
        pipeline.register_disconnection_middleware(probe_obj);

        let harness = make_harness(Arc::new(ScriptedFactory::default()), pipeline);
        if let Ok(mut slot) = probe.registry.lock() {
            *slot = Some(Arc::clone(&harness.registry));
        }

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;
        assert!(harness.registry.contains(&conn()));

        harness.dispatcher.handle_disconnect(&conn()).await;

        assert!(!harness.registry.contains(&conn()));
        let Ok(saw) = saw_removed.lock() else {
            panic!("saw lock poisoned");
        };
        assert_eq!(*saw, Some(true));
    }

    #[tokio::test]
    async fn request_after_disconnect_builds_a_fresh_controller() {
        let factory = Arc::new(CountingFactory::new());
        let factory_obj: Arc<dyn ControllerFactory> = factory.clone();
        let harness = make_harness(factory_obj, MiddlewarePipeline::new());

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;
        harness.dispatcher.handle_disconnect(&conn()).await;
        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        assert_eq!(factory.created.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deprecated_aliases_behave_identically() {
        let make = || {
            make_harness(
                Arc::new(ScriptedFactory {
                    group: Some("room-1".to_string()),
                    ..ScriptedFactory::default()
                }),
                MiddlewarePipeline::new(),
            )
        };
        let current = make();
        let alias = make();

        current
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Text("{\"a\":1}".to_string()))
            .await;
        #[allow(deprecated)]
        alias
            .dispatcher
            .request_vm(&conn(), "Counter", WirePayload::Text("{\"a\":1}".to_string()))
            .await;

        let current_calls = match current.transport.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(_) => Vec::new(),
        };
        let alias_calls = match alias.transport.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(_) => Vec::new(),
        };
        assert_eq!(current_calls, alias_calls);
        assert_eq!(current.registry.len(), alias.registry.len());
    }

    #[tokio::test]
    async fn push_response_delivers_to_live_connection() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );
        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        harness
            .dispatcher
            .push_response("conn-1", "Counter", "{\"Count\":5}")
            .await;

        let pushes = harness.transport.calls_named("send_to_connection");
        assert_eq!(pushes.len(), 1);
        let Some(push) = pushes.first() else {
            panic!("missing push");
        };
        assert_eq!(push.3, "{\"Count\":5}");
    }

    #[tokio::test]
    async fn push_response_drops_when_no_live_controller() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );

        harness
            .dispatcher
            .push_response("ghost", "Counter", "{\"Count\":5}")
            .await;

        assert!(harness.transport.calls_named("send_to_connection").is_empty());
    }

    #[tokio::test]
    async fn push_response_refreshes_keepalive() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );
        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;
        std::thread::sleep(std::time::Duration::from_millis(25));

        harness
            .dispatcher
            .push_response("conn-1", "Counter", "{}")
            .await;

        let evicted = harness
            .registry
            .sweep_idle(std::time::Duration::from_millis(15));
        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn push_response_with_marker_routes_the_envelope() {
        let harness = make_harness(
            Arc::new(ScriptedFactory::default()),
            MiddlewarePipeline::new(),
        );

        let envelope = MulticastEnvelope::Send(SendEnvelope {
            group_name: Some("room-1".to_string()),
            excluded_connection_ids: Vec::new(),
            user_ids: Vec::new(),
            connection_ids: Vec::new(),
            data: "{\"Count\":5}".to_string(),
        });
        let Ok(data) = serde_json::to_string(&envelope) else {
            panic!("envelope serialization failed");
        };

        harness
            .dispatcher
            .push_response(MULTICAST_MARKER, "Counter", &data)
            .await;

        let sends = harness.transport.calls_named("send_to_group");
        assert_eq!(sends.len(), 1);
        let Some(send) = sends.first() else {
            panic!("missing group send");
        };
        assert_eq!(send.1, "room-1");
        assert_eq!(send.3, "{\"Count\":5}");
    }

    #[tokio::test]
    async fn middleware_sees_resolved_principal() {
        struct FixedResolver;

        impl PrincipalResolver for FixedResolver {
            fn resolve(&self, _connection_id: &ConnectionId) -> Option<Principal> {
                Some(Principal::new("alice"))
            }
        }

        struct PrincipalCapture {
            subject: Arc<Mutex<Option<String>>>,
        }

        #[async_trait]
        impl RequestMiddleware for PrincipalCapture {
            async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> PipelineResult {
                if let Ok(mut subject) = self.subject.lock() {
                    *subject = ctx.principal.as_ref().map(|p| p.subject.clone());
                }
                next.run(ctx).await
            }
        }

        let subject = Arc::new(Mutex::new(None));
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register_middleware(Arc::new(PrincipalCapture {
            subject: Arc::clone(&subject),
        }));

        let resolver: Arc<dyn PrincipalResolver> = Arc::new(FixedResolver);
        let harness = make_harness_with(Arc::new(ScriptedFactory::default()), pipeline, Some(resolver));

        harness
            .dispatcher
            .request_view(&conn(), "Counter", WirePayload::Tree(Value::Null))
            .await;

        let Ok(subject) = subject.lock() else {
            panic!("subject lock poisoned");
        };
        assert_eq!(subject.as_deref(), Some("alice"));
    }
}
