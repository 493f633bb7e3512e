//! Type-safe connection identifier.
//!
//! [`ConnectionId`] is a newtype wrapper around the opaque id string the
//! transport assigns to each active session, providing type safety so that
//! connection ids cannot be confused with group names or user ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one active real-time connection.
///
/// The transport owns the id's lifecycle; the hub only references it. Ids are
/// unique per active session and never reused concurrently. Used as the
/// dictionary key in [`super::ControllerRegistry`] and as the delivery target
/// in multicast envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an existing transport-assigned id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
