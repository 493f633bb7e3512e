//! Service layer: call orchestration and multicast routing.
//!
//! [`HubDispatcher`] drives every inbound operation through normalization,
//! the interceptor pipeline, and the resolved controller;
//! [`MulticastRouter`] resolves abstract delivery targets into concrete
//! transport pushes.

pub mod dispatcher;
pub mod multicast;
pub mod transport;

pub use dispatcher::HubDispatcher;
pub use multicast::{MULTICAST_MARKER, MulticastRouter};
pub use transport::{HubTransport, PrincipalResolver};
