//! Error types for the client-side queue and flush path.

use thiserror::Error;

/// Errors from the offline queue or its flush loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local queue database error.
    #[error("queue store error: {0}")]
    Store(#[from] opsync_store::StoreError),

    /// JSON (de)serialization of a queued payload failed.
    #[error("payload serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The gateway was reachable but rejected the request outright
    /// (e.g. identity headers missing). Item-level errors are not
    /// transport failures and are reported through acks instead.
    #[error("gateway rejected request: HTTP {status}")]
    GatewayStatus {
        /// HTTP status code returned.
        status: u16,
    },

    /// The gateway could not be reached at all.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Convenience type alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;
