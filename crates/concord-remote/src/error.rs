use thiserror::Error;

/// Errors produced by the remote store client.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure; callers degrade to the local cache.
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// The service rejected the request.
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A row failed to decode into its record schema.
    #[error("Row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Unique-key violation (the "duplicate key" class).
    #[error("Unique-key conflict on {0}")]
    Conflict(String),

    /// No remote endpoint is configured.
    #[error("Remote store not configured")]
    NotConfigured,

    /// The realtime channel to the socket task is gone.
    #[error("Realtime channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Unreachable(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RemoteError>;
