//! WebSocket layer: wire frames, the connection loop, and the default
//! in-process transport.
//!
//! The WebSocket endpoint at `/ws` carries the hub protocol: clients send
//! method-tagged frames (`request_view`, `update_view`, `dispose_view`,
//! plus their deprecated aliases) and receive `response_view` frames.
//! [`transport::WsTransport`] is the default implementation of the hub's
//! transport collaborator traits.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod transport;
