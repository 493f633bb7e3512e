//! Domain layer: core types, payload normalization, and the controller registry.
//!
//! This module contains the hub-side domain model: connection identity, the
//! per-call request context, wire payload encodings and their canonical form,
//! multicast delivery envelopes, and the concurrent controller registry.

pub mod connection_id;
pub mod context;
pub mod envelope;
pub mod payload;
pub mod registry;

pub use connection_id::ConnectionId;
pub use context::{Operation, Principal, RequestContext};
pub use envelope::{LeaveEnvelope, MulticastEnvelope, SendEnvelope};
pub use payload::WirePayload;
pub use registry::{ControllerFactory, ControllerRegistry, ViewModelController};
