use std::fmt;
use std::io;

use clfsctl_client::ClientError;
use clfsctl_frame::FrameError;
use clfsctl_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Truncated { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::PayloadTooLarge { .. }
        | FrameError::Malformed(_)
        | FrameError::NotAnObject
        | FrameError::MissingCommand => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Transport(err) => transport_error(context, err),
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ClientError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::HandshakeFailed(_) | ClientError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ClientError::IdSpaceExhausted => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_socket_is_a_transport_error() {
        let err = ClientError::Transport(TransportError::Connect {
            path: PathBuf::from("/tmp/missing.sock"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(client_error("connect failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn timeouts_and_bad_data_have_their_own_codes() {
        let timeout = client_error("ping", ClientError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.code, TIMEOUT);
        assert!(timeout.message.starts_with("ping: "));

        let bad = client_error("receive", ClientError::Frame(FrameError::MissingCommand));
        assert_eq!(bad.code, DATA_INVALID);

        let closed = client_error("receive", ClientError::Closed);
        assert_eq!(closed.code, FAILURE);
    }

    #[test]
    fn permission_denied_is_reported() {
        let err = io_error("connect", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
