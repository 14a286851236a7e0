use thiserror::Error;

/// Reasons a connection is turned away before it becomes a peer.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("failed to read join message: {0}")]
    Read(String),

    #[error("join message of {size} bytes exceeds {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("malformed join payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("first message is not a valid join")]
    InvalidJoin,

    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("access denied")]
    AccessDenied,

    #[error("peer setup failed: {0}")]
    PeerSetup(#[source] anyhow::Error),
}

impl AdmissionError {
    /// Text of the `error` message sent to the client, if any is sent at all.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            Self::Read(_) | Self::TooLarge { .. } => None,
            Self::InvalidJson(_) => Some("invalid json"),
            Self::InvalidJoin => Some("invalid join parameters"),
            Self::AuthorizationFailed(_) => Some("authorization failed"),
            Self::AccessDenied => Some("access denied"),
            Self::PeerSetup(_) => Some("peer setup failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer closed")]
    Closed,

    #[error("failed to encode signal: {0}")]
    Serialize(#[from] serde_json::Error),
}
