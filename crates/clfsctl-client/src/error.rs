/// Errors that can occur while talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error, including failure to connect.
    #[error("transport error: {0}")]
    Transport(#[from] clfsctl_transport::TransportError),

    /// Malformed or truncated frame. The connection is unusable afterwards.
    #[error("frame error: {0}")]
    Frame(#[from] clfsctl_frame::FrameError),

    /// A message could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The daemon did not produce a usable handshake message.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A bounded wait ran out of time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Every request id has been used on this connection.
    #[error("request id space exhausted")]
    IdSpaceExhausted,

    /// The connection has already ended or failed.
    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
