//! Hub error taxonomy and the client-facing error envelope.
//!
//! [`HubError`] is the central error type for the hub. Errors raised anywhere
//! in a call — controller logic, pipeline interceptors, payload normalization,
//! transport sends — are funneled into one of its categories. The only shape
//! ever delivered to a client is [`ErrorEnvelope`].

use serde::{Deserialize, Serialize};

/// Client-facing error payload.
///
/// Every unsuppressed failure is reported to the originating connection as
/// exactly one of these, serialized into the ordinary response channel:
/// ```json
/// {
///   "kind": "serialization",
///   "message": "malformed payload: expected value at line 1 column 2"
/// }
/// ```
/// No stack traces or internal detail cross the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// Stable error category discriminator.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum covering every failure category of a hub call.
///
/// # Categories
///
/// | Variant         | Raised by                          | Client-visible |
/// |-----------------|------------------------------------|----------------|
/// | `Application`   | controller logic                   | yes            |
/// | `Cancelled`     | cooperative abort                  | never          |
/// | `Pipeline`      | an interceptor                     | yes            |
/// | `Serialization` | malformed payload during normalize | yes            |
/// | `Transport`     | a collaborator send                | no (logged)    |
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    /// Raised by controller logic while handling a request or update.
    #[error("application error: {0}")]
    Application(String),

    /// The call was cooperatively aborted. Always suppressed: a cancelled
    /// call produces zero client-visible output.
    #[error("call cancelled")]
    Cancelled,

    /// An interceptor in one of the middleware chains failed.
    #[error("pipeline error in {stage}: {message}")]
    Pipeline {
        /// Name of the chain stage that failed (e.g. `"middleware"`).
        stage: String,
        /// What went wrong.
        message: String,
    },

    /// The inbound payload could not be normalized.
    #[error("malformed payload: {0}")]
    Serialization(String),

    /// A transport collaborator call failed. Delivery is fire-and-forget,
    /// so these are logged by the caller and never pushed to a client.
    #[error("transport error: {0}")]
    Transport(String),
}

impl HubError {
    /// Returns the stable category discriminator for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Application(_) => "application",
            Self::Cancelled => "cancelled",
            Self::Pipeline { .. } => "pipeline",
            Self::Serialization(_) => "serialization",
            Self::Transport(_) => "transport",
        }
    }

    /// Returns `true` for the cooperative-cancellation category.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Builds the client-facing envelope for this error.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
