//! Interceptor pipeline: ordered chains wrapped around every hub call.
//!
//! Four chains exist, each with its own contract: general request
//! middlewares, per-view-model filters, exception translators, and
//! disconnect hooks. Stages of one call run strictly in registration
//! order; calls on different connections interleave freely.

pub mod middleware;
pub mod pipeline;

pub use middleware::{
    DisconnectionMiddleware, ErrorDisposition, ExceptionMiddleware, FilterNext, FilterStage,
    Next, PipelineResult, RequestMiddleware, SharedEndpoint, ViewModelFilter, endpoint,
};
pub use pipeline::MiddlewarePipeline;
