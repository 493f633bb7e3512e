//! The registered interceptor chains and their runners.

use std::fmt;
use std::sync::Arc;

use crate::domain::{RequestContext, ViewModelController};
use crate::error::HubError;

use super::middleware::{
    DisconnectionMiddleware, ErrorDisposition, ExceptionMiddleware, FilterNext, FilterStage,
    Next, PipelineResult, RequestMiddleware, SharedEndpoint, ViewModelFilter,
};

/// Holds the four interceptor chains and executes them in registration
/// order around hub calls.
#[derive(Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn RequestMiddleware>>,
    vm_filters: Vec<Arc<dyn ViewModelFilter>>,
    exception_middlewares: Vec<Arc<dyn ExceptionMiddleware>>,
    disconnection_middlewares: Vec<Arc<dyn DisconnectionMiddleware>>,
}

impl MiddlewarePipeline {
    /// Creates a pipeline with no registered interceptors. Every runner
    /// degenerates to calling the endpoint directly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a general middleware. Registration order is execution order.
    pub fn register_middleware(&mut self, middleware: Arc<dyn RequestMiddleware>) {
        self.middlewares.push(middleware);
    }

    /// Registers a per-view-model filter.
    pub fn register_vm_filter(&mut self, filter: Arc<dyn ViewModelFilter>) {
        self.vm_filters.push(filter);
    }

    /// Registers an exception handler.
    pub fn register_exception_middleware(&mut self, middleware: Arc<dyn ExceptionMiddleware>) {
        self.exception_middlewares.push(middleware);
    }

    /// Registers a disconnect hook.
    pub fn register_disconnection_middleware(
        &mut self,
        middleware: Arc<dyn DisconnectionMiddleware>,
    ) {
        self.disconnection_middlewares.push(middleware);
    }

    /// Runs the general middleware chain around `endpoint`.
    ///
    /// # Errors
    ///
    /// Propagates whatever error aborted the chain — an interceptor's or
    /// the endpoint's.
    pub async fn run_middlewares(
        &self,
        ctx: RequestContext,
        endpoint: &SharedEndpoint,
    ) -> PipelineResult {
        Next::new(&self.middlewares, endpoint).run(ctx).await
    }

    /// Runs the view-model filter chain for `stage` around `endpoint`,
    /// with the resolved controller instance in hand.
    ///
    /// # Errors
    ///
    /// Propagates whatever error aborted the chain.
    pub async fn run_vm_filters(
        &self,
        stage: FilterStage,
        ctx: RequestContext,
        controller: Arc<dyn ViewModelController>,
        endpoint: &SharedEndpoint,
    ) -> PipelineResult {
        FilterNext::new(stage, &self.vm_filters, endpoint)
            .run(ctx, controller)
            .await
    }

    /// Folds `error` through the exception handlers in order.
    ///
    /// Returns the final error to report, or `None` when a handler
    /// suppressed it — explicitly, or by rewriting it into the
    /// cancellation category.
    pub async fn run_exception_middleware(
        &self,
        ctx: &RequestContext,
        error: HubError,
    ) -> Option<HubError> {
        let mut current = error;
        for middleware in &self.exception_middlewares {
            match middleware.handle(ctx, current).await {
                ErrorDisposition::Forward(next) => current = next,
                ErrorDisposition::Suppress => {
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        operation = ctx.operation.as_str(),
                        "error suppressed by exception middleware"
                    );
                    return None;
                }
            }
        }
        if current.is_cancellation() {
            return None;
        }
        Some(current)
    }

    /// Notifies every disconnect hook, logging and swallowing failures.
    pub async fn run_disconnection_middlewares(&self, ctx: &RequestContext) {
        for middleware in &self.disconnection_middlewares {
            if let Err(err) = middleware.handle(ctx).await {
                tracing::warn!(
                    connection_id = %ctx.connection_id,
                    error = %err,
                    "disconnection middleware failed"
                );
            }
        }
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("middlewares", &self.middlewares.len())
            .field("vm_filters", &self.vm_filters.len())
            .field("exception_middlewares", &self.exception_middlewares.len())
            .field(
                "disconnection_middlewares",
                &self.disconnection_middlewares.len(),
            )
            .finish()
    }
}
