//! # pulse-hub
//!
//! WebSocket hub dispatcher and multicast router for real-time view-model
//! synchronization.
//!
//! This crate mediates between transport-level real-time connections and
//! per-connection state controllers supplied by the host application. The
//! controllers' own state-diffing logic is external — this service is a
//! coordination layer.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS Connection Loop (ws/)
//!     │
//!     ├── HubDispatcher (service/)
//!     │       │ normalize → middlewares → vm filters → controller
//!     │
//!     ├── MiddlewarePipeline (pipeline/)
//!     ├── MulticastRouter (service/)
//!     │
//!     ├── ControllerRegistry (domain/)
//!     └── WsTransport: connections, groups, users (ws/)
//! ```
//!
//! Every inbound call runs with a fresh per-call [`domain::RequestContext`];
//! the only shared mutable state is the connection-keyed
//! [`domain::ControllerRegistry`].

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod ws;
