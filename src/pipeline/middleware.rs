//! Interceptor traits and the continuation types that chain them.
//!
//! Chains terminate on an endpoint closure supplied by the dispatcher —
//! the actual controller invocation. The call's [`RequestContext`] moves
//! through the chain by value: an interceptor continues the call by
//! handing the context to its continuation and short-circuits by
//! returning without doing so.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::domain::{RequestContext, ViewModelController};
use crate::error::HubError;

/// Result type every chain resolves to.
///
/// The `Option<String>` is the group name surfaced by a request handler;
/// update and dispose endpoints resolve to `None`.
pub type PipelineResult = Result<Option<String>, HubError>;

/// Terminal of a chain: the actual controller invocation, shareable so
/// nested chains can hand it around without lifetime ties.
pub type SharedEndpoint =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, PipelineResult> + Send + Sync>;

/// Wraps an async closure into the endpoint shape the chains terminate on.
pub fn endpoint<F, Fut>(f: F) -> SharedEndpoint
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineResult> + Send + 'static,
{
    let boxed = move |ctx: RequestContext| -> BoxFuture<'static, PipelineResult> {
        Box::pin(f(ctx))
    };
    Arc::new(boxed)
}

/// General interceptor wrapped around every request and update call.
///
/// An implementation may inspect or rewrite `ctx.principal` and
/// `ctx.payload` before continuing, decline to continue by returning
/// without running `next`, do work after the inner call resolves, or
/// abort the chain by returning an error.
#[async_trait]
pub trait RequestMiddleware: Send + Sync {
    /// Intercepts the call. Continue with `next.run(ctx).await`.
    ///
    /// # Errors
    ///
    /// A returned error aborts the chain and fails the call.
    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> PipelineResult;
}

/// Continuation handed to a [`RequestMiddleware`]: the rest of the chain
/// plus the terminal endpoint.
pub struct Next<'a> {
    chain: &'a [Arc<dyn RequestMiddleware>],
    endpoint: &'a SharedEndpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn RequestMiddleware>], endpoint: &'a SharedEndpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the remaining interceptors, then the endpoint.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised downstream.
    pub async fn run(mut self, ctx: RequestContext) -> PipelineResult {
        if let Some((first, rest)) = self.chain.split_first() {
            self.chain = rest;
            first.handle(ctx, self).await
        } else {
            (self.endpoint.as_ref())(ctx).await
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Which controller hook point a view-model filter is wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Before the controller handles a view-model request.
    Request,
    /// Before the controller applies a property patch.
    Update,
    /// Before a response is pushed to a single connection.
    Response,
}

impl FilterStage {
    /// Stable stage name used in logs and stage errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "pre_request",
            Self::Update => "pre_update",
            Self::Response => "pre_response",
        }
    }
}

/// Per-view-model interceptor, invoked with the resolved controller
/// instance. One registration covers all three stages; implementations
/// branch on `stage` when they care.
#[async_trait]
pub trait ViewModelFilter: Send + Sync {
    /// Intercepts the stage. Continue with
    /// `next.run(ctx, controller).await`.
    ///
    /// # Errors
    ///
    /// A returned error aborts the chain and fails the call.
    async fn handle(
        &self,
        stage: FilterStage,
        ctx: RequestContext,
        controller: Arc<dyn ViewModelController>,
        next: FilterNext<'_>,
    ) -> PipelineResult;
}

/// Continuation handed to a [`ViewModelFilter`].
pub struct FilterNext<'a> {
    stage: FilterStage,
    chain: &'a [Arc<dyn ViewModelFilter>],
    endpoint: &'a SharedEndpoint,
}

impl<'a> FilterNext<'a> {
    pub(crate) fn new(
        stage: FilterStage,
        chain: &'a [Arc<dyn ViewModelFilter>],
        endpoint: &'a SharedEndpoint,
    ) -> Self {
        Self {
            stage,
            chain,
            endpoint,
        }
    }

    /// Runs the remaining filters, then the endpoint.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised downstream.
    pub async fn run(
        mut self,
        ctx: RequestContext,
        controller: Arc<dyn ViewModelController>,
    ) -> PipelineResult {
        if let Some((first, rest)) = self.chain.split_first() {
            self.chain = rest;
            first.handle(self.stage, ctx, controller, self).await
        } else {
            (self.endpoint.as_ref())(ctx).await
        }
    }
}

impl fmt::Debug for FilterNext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNext")
            .field("stage", &self.stage)
            .field("remaining", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// What an exception handler decided to do with a failed call's error.
#[derive(Debug)]
pub enum ErrorDisposition {
    /// Hand this (possibly rewritten) error to the next handler, or to the
    /// client if no handler remains.
    Forward(HubError),
    /// Do not forward anything to the client.
    Suppress,
}

/// Gets a chance to rewrite, replace, or suppress the error of a failed
/// call before anything reaches the client.
#[async_trait]
pub trait ExceptionMiddleware: Send + Sync {
    /// Examines `error` for the call described by `ctx`.
    async fn handle(&self, ctx: &RequestContext, error: HubError) -> ErrorDisposition;
}

/// Notification hook run after a disconnected connection's controller has
/// been discarded. Failures are logged by the runner, never surfaced.
#[async_trait]
pub trait DisconnectionMiddleware: Send + Sync {
    /// Observes the disconnect described by `ctx`.
    ///
    /// # Errors
    ///
    /// Any returned error is logged and swallowed by the pipeline runner.
    async fn handle(&self, ctx: &RequestContext) -> Result<(), HubError>;
}
