use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use clfsctl_transport::IpcStream;
use tracing::trace;

use crate::codec::{encode_end_of_stream, encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::json::{encode_object, Object};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one payload (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if let Some(max) = self.config.max_payload_size {
            if payload.len() > max {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max,
                });
            }
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;
        trace!(len = payload.len(), "sending frame");
        self.write_buffered()
    }

    /// Serialize a JSON object and send it as one frame.
    pub fn send_object(&mut self, object: &Object) -> Result<()> {
        let payload = encode_object(object)?;
        self.send(&payload)
    }

    /// Send the zero-length end-of-stream sentinel.
    pub fn send_end_of_stream(&mut self) -> Result<()> {
        self.buf.clear();
        encode_end_of_stream(&mut self.buf);
        trace!("sending end-of-stream sentinel");
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    return Err(FrameError::Truncated {
                        expected: self.buf.len(),
                        received: offset,
                    })
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // Part of the frame is already on the wire; a retry would
                // start a new header inside it.
                Err(err) if offset > 0 && is_timeout_kind(err.kind()) => {
                    return Err(FrameError::Truncated {
                        expected: self.buf.len(),
                        received: offset,
                    })
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl FrameWriter<IpcStream> {
    /// Create a frame writer for `IpcStream` and apply write timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
