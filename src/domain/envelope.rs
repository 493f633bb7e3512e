//! Multicast delivery envelopes.
//!
//! When a push targets anything other than a single live connection, its
//! destination travels as a [`MulticastEnvelope`] serialized into the
//! response data. The router resolves the envelope to concrete transport
//! calls; see `service::multicast` for the resolution precedence.

use serde::{Deserialize, Serialize};

use super::ConnectionId;

/// Abstract delivery target plus the payload to deliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MulticastEnvelope {
    /// Deliver `data` to a group, a set of logical users, or an explicit
    /// connection list.
    Send(SendEnvelope),
    /// Remove exactly one `(connection, group)` membership pair.
    Leave(LeaveEnvelope),
}

/// Target description for a multicast send.
///
/// More than one target field may be populated; the router picks the first
/// applicable branch in the order the fields are declared here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SendEnvelope {
    /// Named group to deliver to, minus any excluded connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Connections excluded from a group delivery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_connection_ids: Vec<ConnectionId>,
    /// Logical users whose connections should all receive the push.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
    /// Explicit connections to deliver to individually.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_ids: Vec<ConnectionId>,
    /// Serialized view-model data to deliver.
    pub data: String,
}

/// Unsubscribe request: one connection leaves one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaveEnvelope {
    /// The connection leaving the group.
    pub connection_id: ConnectionId,
    /// The group being left.
    pub group_name: String,
}
