//! Error types for station synchronization

use gatecheck_core::store::TicketStoreError;
use thiserror::Error;

/// Errors that can occur during a sync cycle
///
/// Every variant except [`SyncError::Merge`] leaves the local store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Network or TLS failure before a response arrived
    #[error("Transport failed: {0}")]
    Transport(String),

    /// The authority answered with a non-success status
    #[error("Authority returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Request could not be serialized or sealed, or the response was not base64
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Response did not open under the configured keys
    #[error("Response could not be decrypted")]
    Decryption,

    /// Decrypted response is not a valid ticket list
    #[error("Invalid sync payload: {0}")]
    Payload(String),

    /// A configured key is not 32 bytes of base64
    #[error("Invalid {name} key: {reason}")]
    InvalidKey {
        /// Which key
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Endpoint is not `https://`
    #[error("Refusing insecure sync endpoint: {0}")]
    InsecureEndpoint(String),

    /// Another sync is in flight; this one was skipped
    #[error("Sync already running")]
    AlreadyRunning,

    /// The local store failed while reading the cursor or merging
    #[error("Local store rejected the sync: {0}")]
    Merge(#[from] TicketStoreError),
}

impl SyncError {
    /// Short label used for the `sync.failed` metric
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Encoding(_) => "encoding",
            Self::Decryption => "decryption",
            Self::Payload(_) => "payload",
            Self::InvalidKey { .. } => "invalid_key",
            Self::InsecureEndpoint(_) => "insecure_endpoint",
            Self::AlreadyRunning => "already_running",
            Self::Merge(_) => "merge",
        }
    }
}
