use std::path::Path;

use clfsctl_frame::{decode_object, Decoded, FrameReader, FrameWriter, Object};
use clfsctl_transport::IpcStream;
#[cfg(unix)]
use clfsctl_transport::UnixDomainSocket;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::correlator::IdCounter;
use crate::deadline::Deadline;
use crate::error::{ClientError, Result};
use crate::message::Message;

/// Where a connection is in its life.
///
/// Connecting and handshaking happen inside [`Connection::connect`]; a
/// failure there returns an error instead of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done; messages can flow both ways.
    Ready,
    /// The daemon ended the stream. Further reads report end of stream.
    Closed,
    /// A framing or write error broke the stream. Further I/O is refused.
    Failed,
}

/// Result of one receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Message(Message),
    EndOfStream,
}

/// An open control connection to the daemon.
///
/// Owns the socket exclusively. The handshake message is read once during
/// construction and kept for the lifetime of the connection. The socket is
/// shut down on end of stream, on a broken stream, and on drop.
pub struct Connection {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
    info: Object,
    ids: IdCounter,
    state: ConnectionState,
}

impl Connection {
    /// Connect to the daemon's control socket and read its handshake.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(path, &ClientConfig::default())
    }

    /// Connect with explicit configuration.
    pub fn connect_with_config(path: impl AsRef<Path>, config: &ClientConfig) -> Result<Self> {
        #[cfg(not(unix))]
        {
            let _ = config;
            return Err(clfsctl_transport::TransportError::Connect {
                path: path.as_ref().to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "the control socket requires Unix domain sockets",
                ),
            }
            .into());
        }

        #[cfg(unix)]
        {
            let stream = UnixDomainSocket::connect(path)?;
            Self::from_stream(stream, config)
        }
    }

    /// Take ownership of an already connected stream and read the handshake.
    ///
    /// Exactly one frame is read before this returns. If it fails, the stream
    /// is dropped and thereby closed.
    pub fn from_stream(stream: IpcStream, config: &ClientConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let mut reader = FrameReader::with_config_ipc(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_ipc(stream, config.frame.clone())?;

        let deadline = config.handshake_timeout.map(Deadline::after);
        let info = match read_frame_before(&mut reader, deadline.as_ref()) {
            Ok(Decoded::Frame(payload)) => decode_object(&payload)?,
            Ok(Decoded::EndOfStream) => {
                return Err(ClientError::HandshakeFailed(
                    "daemon closed the connection before its handshake".to_string(),
                ))
            }
            Err(ClientError::Frame(err)) if err.is_timeout() => {
                return Err(ClientError::Timeout(
                    config.frame.read_timeout.unwrap_or_default(),
                ))
            }
            Err(err) => return Err(err),
        };
        debug!(fields = info.len(), "handshake received");

        Ok(Self {
            reader,
            writer,
            info,
            ids: IdCounter::new(),
            state: ConnectionState::Ready,
        })
    }

    /// The handshake message. Never performs I/O.
    pub fn info(&self) -> &Object {
        &self.info
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Stamp the next outgoing request.
    pub fn next_id(&mut self) -> Result<u64> {
        self.ids.next_id()
    }

    /// The most recently assigned request id (0 before the first request).
    pub fn last_id(&self) -> u64 {
        self.ids.last()
    }

    /// `(uid, gid, pid)` of the daemon process, where the platform reports it.
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        self.reader.get_ref().peer_credentials()
    }

    /// Encode and send one message (blocking).
    ///
    /// A write timeout before any byte went out leaves the connection ready.
    /// Once part of the frame is written, any failure marks it failed.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(ClientError::Closed);
        }

        let object = message.to_object()?;
        match self.writer.send_object(&object) {
            Ok(()) => {
                debug!(command = message.command(), id = ?message.id(), "message sent");
                Ok(())
            }
            Err(err) if err.is_timeout() => Err(ClientError::Timeout(
                self.writer.config().write_timeout.unwrap_or_default(),
            )),
            Err(err) => {
                self.shut_down(ConnectionState::Failed);
                Err(err.into())
            }
        }
    }

    /// Block until the next message or end of stream.
    pub fn receive(&mut self) -> Result<Received> {
        self.receive_before(None)
    }

    /// Like [`Connection::receive`], but give up with
    /// [`ClientError::Timeout`] once `deadline` passes.
    ///
    /// A timeout leaves the connection usable; a partially received frame is
    /// kept and completed by the next call.
    pub fn receive_before(&mut self, deadline: Option<&Deadline>) -> Result<Received> {
        match self.state {
            ConnectionState::Ready => {}
            ConnectionState::Closed => return Ok(Received::EndOfStream),
            ConnectionState::Failed => return Err(ClientError::Closed),
        }

        let decoded = match read_frame_before(&mut self.reader, deadline) {
            Ok(decoded) => decoded,
            Err(ClientError::Frame(err)) if err.is_timeout() => {
                return Err(ClientError::Timeout(
                    self.reader.config().read_timeout.unwrap_or_default(),
                ))
            }
            Err(err @ ClientError::Frame(_)) => {
                self.shut_down(ConnectionState::Failed);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let payload = match decoded {
            Decoded::Frame(payload) => payload,
            Decoded::EndOfStream => {
                debug!("daemon ended the control stream");
                self.shut_down(ConnectionState::Closed);
                return Ok(Received::EndOfStream);
            }
        };

        match decode_object(&payload).and_then(Message::from_object) {
            Ok(message) => {
                trace!(command = message.command(), id = ?message.id(), "message received");
                Ok(Received::Message(message))
            }
            Err(err) => {
                self.shut_down(ConnectionState::Failed);
                Err(err.into())
            }
        }
    }

    fn shut_down(&mut self, state: ConnectionState) {
        self.state = state;
        if let Err(err) = self.reader.get_ref().shutdown() {
            debug!(error = %err, "control stream shutdown failed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::Ready {
            self.shut_down(ConnectionState::Closed);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("last_id", &self.ids.last())
            .field("info", &self.info)
            .finish()
    }
}

/// Read one frame, optionally bounded by `deadline`.
///
/// Stream timeouts are only an implementation detail of the deadline here:
/// they are retried until the deadline itself runs out, then the configured
/// read timeout is put back.
fn read_frame_before(
    reader: &mut FrameReader<IpcStream>,
    deadline: Option<&Deadline>,
) -> Result<Decoded> {
    let Some(deadline) = deadline else {
        return Ok(reader.read_frame()?);
    };

    let result = loop {
        let Some(remaining) = deadline.remaining() else {
            break Err(ClientError::Timeout(deadline.budget()));
        };
        reader.apply_read_timeout(Some(remaining))?;
        match reader.read_frame() {
            Err(err) if err.is_timeout() => continue,
            other => break other.map_err(ClientError::from),
        }
    };
    reader.restore_read_timeout()?;
    result
}
