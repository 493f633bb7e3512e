//! Per-call ambient state.
//!
//! [`RequestContext`] carries everything a pipeline stage may need about the
//! call it is intercepting. One context is created fresh per inbound call and
//! threaded `&mut` through the stages of that call only — it is never stored
//! in shared state, so concurrent calls on different connections cannot
//! observe each other's identity or payload.

use std::collections::BTreeMap;

use serde_json::Value;

use super::ConnectionId;

/// Authenticated identity associated with a connection, resolved per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable subject identifier (e.g. a user name).
    pub subject: String,
    /// Additional identity claims.
    pub claims: BTreeMap<String, String>,
}

impl Principal {
    /// Creates a principal with the given subject and no claims.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            claims: BTreeMap::new(),
        }
    }
}

/// The kind of call a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A client requested a view model.
    RequestView,
    /// A client pushed a property patch to a view model.
    UpdateView,
    /// A client released a view model.
    DisposeView,
    /// The transport reported a closed connection.
    Disconnect,
    /// An outbound push on its way to a single connection.
    Response,
}

impl Operation {
    /// Stable operation name used in logs and stage errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestView => "request_view",
            Self::UpdateView => "update_view",
            Self::DisposeView => "dispose_view",
            Self::Disconnect => "disconnect",
            Self::Response => "response",
        }
    }
}

/// Ambient state for one call, visible to every pipeline stage of that call.
///
/// Interceptors may rewrite `principal` and `payload`; the identity fields
/// are fixed at creation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The originating (or destination, for [`Operation::Response`]) connection.
    pub connection_id: ConnectionId,
    /// Which operation this call performs.
    pub operation: Operation,
    /// Target view-model id. Empty for [`Operation::Disconnect`].
    pub vm_id: String,
    /// Canonical payload tree produced by the normalizer.
    pub payload: Value,
    /// Authenticated identity, if the transport knows one.
    pub principal: Option<Principal>,
}

impl RequestContext {
    /// Creates a context with an empty payload.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        operation: Operation,
        vm_id: impl Into<String>,
        principal: Option<Principal>,
    ) -> Self {
        Self {
            connection_id,
            operation,
            vm_id: vm_id.into(),
            payload: Value::Null,
            principal,
        }
    }
}
