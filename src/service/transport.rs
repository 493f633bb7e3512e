//! Collaborator interfaces supplied by the hosting transport.
//!
//! The hub never manages connection lifecycles itself; it asks the
//! transport to deliver frames and maintain group membership through
//! [`HubTransport`], and optionally asks it who a connection is through
//! [`PrincipalResolver`]. Capabilities are injected explicitly at
//! construction time — the hub never probes a collaborator for what it
//! might support.

use async_trait::async_trait;

use crate::domain::{ConnectionId, Principal};
use crate::error::HubError;

/// Outbound delivery and group membership, implemented by the transport.
///
/// All calls are asynchronous and fire-and-forget from the hub's point of
/// view: a failed send is logged by the caller, never escalated into a
/// client-visible error.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Delivers a response frame to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when delivery is impossible; the
    /// caller logs and moves on.
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError>;

    /// Delivers a response frame to every member of a group.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when delivery is impossible.
    async fn send_to_group(&self, group_name: &str, vm_id: &str, data: &str)
    -> Result<(), HubError>;

    /// Delivers a response frame to every group member not excluded.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when delivery is impossible.
    async fn send_to_group_except(
        &self,
        group_name: &str,
        excluded: &[ConnectionId],
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError>;

    /// Delivers a response frame to every connection of the given users.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when delivery is impossible.
    async fn send_to_users(
        &self,
        user_ids: &[String],
        vm_id: &str,
        data: &str,
    ) -> Result<(), HubError>;

    /// Adds a connection to a named group.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when the membership change fails.
    async fn add_connection_to_group(
        &self,
        connection_id: &ConnectionId,
        group_name: &str,
    ) -> Result<(), HubError>;

    /// Removes a connection from a named group.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] when the membership change fails.
    async fn remove_connection_from_group(
        &self,
        connection_id: &ConnectionId,
        group_name: &str,
    ) -> Result<(), HubError>;
}

/// Optional capability: resolve the authenticated principal behind a
/// connection. Absent when the transport has no identity concept.
pub trait PrincipalResolver: Send + Sync {
    /// Returns the principal for `connection_id`, if one is known.
    fn resolve(&self, connection_id: &ConnectionId) -> Option<Principal>;
}
