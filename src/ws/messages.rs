//! WebSocket wire frames: inbound methods and outbound responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → server frame, tagged by method name.
///
/// Every method is also reachable by its deprecated alias
/// (`request_vm`, `update_vm`, `dispose_vm`) with identical behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Request a view model.
    #[serde(alias = "request_vm")]
    RequestView {
        /// Target view-model id.
        vm_id: String,
        /// Request argument; defaults to `null`.
        #[serde(default)]
        arg: Value,
    },
    /// Push a property patch to a view model.
    #[serde(alias = "update_vm")]
    UpdateView {
        /// Target view-model id.
        vm_id: String,
        /// Property name → new value.
        #[serde(default)]
        patch: Map<String, Value>,
    },
    /// Release a view model.
    #[serde(alias = "dispose_vm")]
    DisposeView {
        /// Target view-model id.
        vm_id: String,
    },
}

/// Server → client frame carrying serialized view-model data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerFrame {
    /// Outbound method name; always `"response_view"`.
    pub method: String,
    /// Source view-model id.
    pub vm_id: String,
    /// Serialized view-model data (or an error envelope).
    pub data: String,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ServerFrame {
    /// Builds a `response_view` frame stamped with the current time.
    #[must_use]
    pub fn response(vm_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            method: "response_view".to_string(),
            vm_id: vm_id.into(),
            data: data.into(),
            timestamp: Utc::now(),
        }
    }
}
