/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured (or wire-format) maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An empty payload cannot be framed; its length would read as end-of-stream.
    #[error("empty payload (a zero length is the end-of-stream sentinel)")]
    EmptyPayload,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended part-way through a frame.
    #[error("truncated frame (expected {expected} bytes, received {received})")]
    Truncated { expected: usize, received: usize },

    /// The payload is not valid JSON, or a field has the wrong type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("message payload is not a JSON object")]
    NotAnObject,

    /// The message has no string `command` field.
    #[error("message has no command field")]
    MissingCommand,
}

impl FrameError {
    /// True if this error is a read or write timeout on the stream.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
