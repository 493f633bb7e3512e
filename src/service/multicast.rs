//! Multicast routing: abstract delivery targets to concrete pushes.
//!
//! [`MulticastRouter`] resolves a [`MulticastEnvelope`] against the
//! transport collaborator. Resolution precedence for a send envelope,
//! first applicable branch wins:
//!
//! 1. `group_name` set — deliver to the group minus any excluded
//!    connections (empty exclusion set means the whole group);
//! 2. else non-empty `user_ids` — deliver to every connection of those
//!    logical users;
//! 3. else non-empty `connection_ids` — deliver to each listed id.
//!
//! Every id explicitly listed in `connection_ids` has its controller's
//! keepalive refreshed before any delivery is attempted, regardless of
//! which branch fires or whether the send later fails.

use std::fmt;
use std::sync::Arc;

use crate::domain::{ConnectionId, ControllerRegistry, MulticastEnvelope, SendEnvelope};

use super::transport::HubTransport;

/// Reserved destination-id prefix marking a multicast push.
///
/// A `push_response` whose destination starts with this marker carries a
/// serialized [`MulticastEnvelope`] in its data instead of view-model
/// state for a single connection.
pub const MULTICAST_MARKER: &str = "$mcast";

/// Resolves multicast envelopes and group membership changes against the
/// transport.
pub struct MulticastRouter {
    transport: Arc<dyn HubTransport>,
    registry: Arc<ControllerRegistry>,
}

impl MulticastRouter {
    /// Creates a router delivering through `transport` and refreshing
    /// keepalives in `registry`.
    #[must_use]
    pub fn new(transport: Arc<dyn HubTransport>, registry: Arc<ControllerRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Routes one envelope. Delivery failures are logged; membership
    /// removal failures are logged. Nothing escalates to the caller.
    pub async fn route(&self, envelope: MulticastEnvelope, vm_id: &str) {
        match envelope {
            MulticastEnvelope::Send(send) => self.route_send(send, vm_id).await,
            MulticastEnvelope::Leave(leave) => {
                if let Err(err) = self
                    .transport
                    .remove_connection_from_group(&leave.connection_id, &leave.group_name)
                    .await
                {
                    tracing::warn!(
                        connection_id = %leave.connection_id,
                        group = %leave.group_name,
                        error = %err,
                        "group leave failed"
                    );
                }
            }
        }
    }

    async fn route_send(&self, envelope: SendEnvelope, vm_id: &str) {
        // Explicitly listed connections count as activity no matter how
        // the envelope ends up being delivered.
        for connection_id in &envelope.connection_ids {
            let _ = self.registry.touch(connection_id);
        }

        let outcome = if let Some(group_name) = envelope.group_name.as_deref() {
            if envelope.excluded_connection_ids.is_empty() {
                self.transport
                    .send_to_group(group_name, vm_id, &envelope.data)
                    .await
            } else {
                self.transport
                    .send_to_group_except(
                        group_name,
                        &envelope.excluded_connection_ids,
                        vm_id,
                        &envelope.data,
                    )
                    .await
            }
        } else if !envelope.user_ids.is_empty() {
            self.transport
                .send_to_users(&envelope.user_ids, vm_id, &envelope.data)
                .await
        } else if !envelope.connection_ids.is_empty() {
            let mut first_failure = Ok(());
            for connection_id in &envelope.connection_ids {
                let sent = self
                    .transport
                    .send_to_connection(connection_id, vm_id, &envelope.data)
                    .await;
                if sent.is_err() && first_failure.is_ok() {
                    first_failure = sent;
                }
            }
            first_failure
        } else {
            tracing::debug!(vm_id, "multicast envelope named no target");
            Ok(())
        };

        if let Err(err) = outcome {
            tracing::warn!(vm_id, error = %err, "multicast delivery failed");
        }
    }

    /// Joins a connection to a named group. Used after a request handler
    /// surfaces a group name.
    pub async fn join_group(&self, connection_id: &ConnectionId, group_name: &str) {
        if let Err(err) = self
            .transport
            .add_connection_to_group(connection_id, group_name)
            .await
        {
            tracing::warn!(
                %connection_id,
                group = group_name,
                error = %err,
                "group join failed"
            );
        }
    }
}

impl fmt::Debug for MulticastRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulticastRouter").finish_non_exhaustive()
    }
}
