//! Concurrent controller storage keyed by connection id.
//!
//! [`ControllerRegistry`] holds exactly one controller instance per active
//! connection, created lazily on first access and discarded on disconnect.
//! Entries live in a [`DashMap`], whose per-shard locking gives atomic
//! get-or-create and remove per key without serializing unrelated
//! connections behind one lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::ConnectionId;
use crate::error::HubError;

/// Per-connection state controller, supplied by the host application.
///
/// One instance exists per active connection id. The hub drives the three
/// operations below; what the controller does with them (state diffing,
/// property binding) is its own business.
#[async_trait]
pub trait ViewModelController: Send + Sync {
    /// Handles a view-model request. A returned non-empty group name asks
    /// the hub to join the connection to that multicast group.
    ///
    /// # Errors
    ///
    /// A [`HubError`] fails the call; unless cancelled or suppressed it is
    /// reported back to the originating connection.
    async fn on_request(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &Value,
    ) -> Result<Option<String>, HubError>;

    /// Applies a property patch to a view model.
    ///
    /// # Errors
    ///
    /// A [`HubError`] fails the call; unless cancelled or suppressed it is
    /// reported back to the originating connection.
    async fn on_update(
        &self,
        connection_id: &ConnectionId,
        vm_id: &str,
        data: &Value,
    ) -> Result<(), HubError>;

    /// Releases a view model.
    ///
    /// # Errors
    ///
    /// A [`HubError`] here is observed by the exception stage only; it is
    /// never forwarded to the client.
    async fn on_dispose(&self, connection_id: &ConnectionId, vm_id: &str)
    -> Result<(), HubError>;
}

/// Creates controller instances on first access for a connection.
pub trait ControllerFactory: Send + Sync {
    /// Builds the controller for a newly seen connection.
    fn create(&self, connection_id: &ConnectionId) -> Arc<dyn ViewModelController>;
}

/// A registered controller plus its keepalive stamp (millis since the
/// registry's epoch, atomic so the send path never blocks on a lock).
struct ControllerEntry {
    controller: Arc<dyn ViewModelController>,
    last_active: AtomicU64,
}

/// Central store for all active per-connection controllers.
///
/// # Concurrency
///
/// - `get_or_create` is atomic per connection id: concurrent calls for the
///   same id observe a single factory invocation.
/// - `remove` is idempotent and race-safe against a concurrent
///   `get_or_create`: the caller either gets the old instance (which the
///   remove then discards) or a fresh one — never a resurrected stale
///   controller.
pub struct ControllerRegistry {
    entries: DashMap<ConnectionId, ControllerEntry>,
    factory: Arc<dyn ControllerFactory>,
    epoch: Instant,
}

impl ControllerRegistry {
    /// Creates an empty registry backed by the given factory.
    #[must_use]
    pub fn new(factory: Arc<dyn ControllerFactory>) -> Self {
        Self {
            entries: DashMap::new(),
            factory,
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the controller for `connection_id`, creating it on first
    /// access. Refreshes the entry's keepalive stamp.
    #[must_use]
    pub fn get_or_create(&self, connection_id: &ConnectionId) -> Arc<dyn ViewModelController> {
        let now = self.now_millis();
        let entry = self
            .entries
            .entry(connection_id.clone())
            .or_insert_with(|| {
                tracing::debug!(%connection_id, "controller created");
                ControllerEntry {
                    controller: self.factory.create(connection_id),
                    last_active: AtomicU64::new(now),
                }
            });
        entry.last_active.store(now, Ordering::Relaxed);
        Arc::clone(&entry.controller)
    }

    /// Returns the live controller for `connection_id`, if any, refreshing
    /// its keepalive stamp. Never creates.
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<dyn ViewModelController>> {
        let entry = self.entries.get(connection_id)?;
        entry.last_active.store(self.now_millis(), Ordering::Relaxed);
        Some(Arc::clone(&entry.controller))
    }

    /// Refreshes the keepalive stamp for `connection_id`. Returns `true`
    /// if an entry existed.
    pub fn touch(&self, connection_id: &ConnectionId) -> bool {
        match self.entries.get(connection_id) {
            Some(entry) => {
                entry.last_active.store(self.now_millis(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Removes and discards the controller for `connection_id`. Idempotent:
    /// returns `true` only if an entry was actually removed. A later
    /// `get_or_create` for the same id builds a fresh instance.
    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.entries.remove(connection_id).is_some();
        if removed {
            tracing::debug!(%connection_id, "controller removed");
        }
        removed
    }

    /// Returns `true` if a controller exists for `connection_id`.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// Returns the number of live controllers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no controllers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts controllers idle for longer than `max_idle`, returning the
    /// evicted connection ids.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<ConnectionId> {
        let now = self.now_millis();
        let cutoff = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let mut evicted = Vec::new();
        self.entries.retain(|connection_id, entry| {
            let idle = now.saturating_sub(entry.last_active.load(Ordering::Relaxed));
            if idle > cutoff {
                evicted.push(connection_id.clone());
                false
            } else {
                true
            }
        });
        for connection_id in &evicted {
            tracing::info!(%connection_id, "idle controller evicted");
        }
        evicted
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
