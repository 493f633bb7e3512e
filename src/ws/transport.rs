//! Default in-process transport: connection, group, and user tables.
//!
//! [`WsTransport`] owns the outbound side of every WebSocket connection
//! (an unbounded frame queue per connection) plus the group-membership
//! and logical-user tables the multicast branches resolve against. It
//! implements both collaborator traits the hub consumes:
//! [`HubTransport`] for delivery and [`PrincipalResolver`] for identity.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::domain::{ConnectionId, Principal};
use crate::error::HubError;
use crate::service::{HubTransport, PrincipalResolver};

use super::messages::ServerFrame;

/// Connection-keyed delivery tables shared by all WebSocket sessions.
#[derive(Default)]
pub struct WsTransport {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerFrame>>,
    groups: DashMap<String, HashSet<ConnectionId>>,
    users: DashMap<String, HashSet<ConnectionId>>,
    principals: DashMap<ConnectionId, Principal>,
}

impl WsTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, returning the receiving end of its
    /// outbound frame queue. A `user` binds the connection to that
    /// logical user and makes it resolvable as a principal.
    pub fn register(
        &self,
        connection_id: &ConnectionId,
        user: Option<String>,
    ) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id.clone(), tx);
        if let Some(user) = user {
            self.users
                .entry(user.clone())
                .or_default()
                .insert(connection_id.clone());
            self.principals
                .insert(connection_id.clone(), Principal::new(user));
        }
        rx
    }

    /// Drops a connection from every table: outbound queue, principal,
    /// group memberships, and user bindings.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);
        self.principals.remove(connection_id);
        for mut entry in self.groups.iter_mut() {
            entry.value_mut().remove(connection_id);
        }
        self.groups.retain(|_, members| !members.is_empty());
        for mut entry in self.users.iter_mut() {
            entry.value_mut().remove(connection_id);
        }
        self.users.retain(|_, connections| !connections.is_empty());
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` when no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of a group's current members.
    #[must_use]
    pub fn group_members(&self, group_name: &str) -> Vec<ConnectionId> {
        self.groups
            .get(group_name)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, connection_id: &ConnectionId, frame: ServerFrame) -> Result<(), HubError> {
        let Some(tx) = self.connections.get(connection_id) else {
            return Err(HubError::Transport(format!(
                "unknown connection {connection_id}"
            )));
        };
        tx.send(frame)
            .map_err(|_| HubError::Transport(format!("connection {connection_id} queue closed")))
    }
}

#[async_trait]
impl HubTransport for WsTransport {
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError> {
        self.deliver(connection_id, ServerFrame::response(vm_id, data))
    }

    async fn send_to_group(
        &self,
        group_name: &str,
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError> {
        for connection_id in self.group_members(group_name) {
            if let Err(err) = self.deliver(&connection_id, ServerFrame::response(vm_id, data)) {
                tracing::debug!(%connection_id, group = group_name, error = %err, "group member unreachable");
            }
        }
        Ok(())
    }

    async fn send_to_group_except(
        &self,
        group_name: &str,
        excluded: &[ConnectionId],
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError> {
        for connection_id in self.group_members(group_name) {
            if excluded.contains(&connection_id) {
                continue;
            }
            if let Err(err) = self.deliver(&connection_id, ServerFrame::response(vm_id, data)) {
                tracing::debug!(%connection_id, group = group_name, error = %err, "group member unreachable");
            }
        }
        Ok(())
    }

    async fn send_to_users(
        &self,
        user_ids: &[String],
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError> {
        for user_id in user_ids {
            let connections: Vec<ConnectionId> = self
                .users
                .get(user_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for connection_id in connections {
                if let Err(err) = self.deliver(&connection_id, ServerFrame::response(vm_id, data)) {
                    tracing::debug!(%connection_id, user = %user_id, error = %err, "user connection unreachable");
                }
            }
        }
        Ok(())
    }

    async fn add_connection_to_group(
        &self,
        connection_id: &ConnectionId,
        group_name: &str,
    ) -> Result<(), HubError> {
        self.groups
            .entry(group_name.to_string())
            .or_default()
            .insert(connection_id.clone());
        Ok(())
    }

    async fn remove_connection_from_group(
        &self,
        connection_id: &ConnectionId,
        group_name: &str,
    ) -> Result<(), HubError> {
        if let Some(mut members) = self.groups.get_mut(group_name) {
            members.remove(connection_id);
        }
        self.groups.retain(|_, members| !members.is_empty());
        Ok(())
    }
}

impl PrincipalResolver for WsTransport {
    fn resolve(&self, connection_id: &ConnectionId) -> Option<Principal> {
        self.principals
            .get(connection_id)
            .map(|principal| principal.clone())
    }
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("connections", &self.connections.len())
            .field("groups", &self.groups.len())
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}
