use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use clfsctl_transport::IpcStream;
use tracing::trace;

use crate::codec::{decode_frame, expected_len, Decoded, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::json::{decode_object, Object};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally, so callers always get complete frames.
/// Bytes already received are kept across calls: if a read times out halfway
/// through a frame, the next call picks up where it left off.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next frame (blocking).
    ///
    /// A zero-length frame, or the stream closing exactly between frames,
    /// yields [`Decoded::EndOfStream`]. Closing part-way through a header or
    /// payload is [`FrameError::Truncated`].
    pub fn read_frame(&mut self) -> Result<Decoded> {
        loop {
            if let Some(decoded) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                if let Decoded::Frame(payload) = &decoded {
                    trace!(len = payload.len(), "frame received");
                } else {
                    trace!("end-of-stream sentinel received");
                }
                return Ok(decoded);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return self.closed();
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next frame and parse its payload as a JSON object.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn read_object(&mut self) -> Result<Option<Object>> {
        match self.read_frame()? {
            Decoded::Frame(payload) => decode_object(&payload).map(Some),
            Decoded::EndOfStream => Ok(None),
        }
    }

    fn closed(&mut self) -> Result<Decoded> {
        if self.buf.is_empty() {
            trace!("stream closed at frame boundary");
            return Ok(Decoded::EndOfStream);
        }
        let received = self.buf.len();
        let expected = expected_len(&self.buf).unwrap_or(HEADER_SIZE);
        self.buf.clear();
        Err(FrameError::Truncated { expected, received })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        let reader = Self::with_config(inner, config);
        reader.apply_read_timeout(reader.config.read_timeout)?;
        Ok(reader)
    }

    /// Change the read timeout of the underlying stream for subsequent reads.
    ///
    /// The configured value is left untouched; call
    /// [`FrameReader::restore_read_timeout`] to go back to it.
    pub fn apply_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner
            .set_read_timeout(timeout)
            .map_err(transport_to_frame_error)
    }

    /// Reset the stream's read timeout to the configured value.
    pub fn restore_read_timeout(&self) -> Result<()> {
        self.apply_read_timeout(self.config.read_timeout)
    }
}

pub(crate) fn transport_to_frame_error(err: clfsctl_transport::TransportError) -> FrameError {
    match err {
        clfsctl_transport::TransportError::Io(io)
        | clfsctl_transport::TransportError::Accept(io) => FrameError::Io(io),
        clfsctl_transport::TransportError::Bind { source, .. }
        | clfsctl_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::codec::{encode_end_of_stream, encode_frame};

    fn wire(frames: &[&[u8]]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"{\"command\":\"pong\"}"])));
        assert_eq!(
            reader.read_frame().unwrap(),
            Decoded::Frame(Bytes::from_static(b"{\"command\":\"pong\"}"))
        );
    }

    #[test]
    fn read_multiple_frames_then_clean_close() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        for expected in [&b"one"[..], b"two", b"three"] {
            match reader.read_frame().unwrap() {
                Decoded::Frame(payload) => assert_eq!(payload.as_ref(), expected),
                Decoded::EndOfStream => panic!("unexpected end of stream"),
            }
        }
        assert_eq!(reader.read_frame().unwrap(), Decoded::EndOfStream);
    }

    #[test]
    fn zero_length_frame_ends_stream_even_with_trailing_bytes() {
        let mut bytes = BytesMut::new();
        encode_end_of_stream(&mut bytes);
        encode_frame(b"{\"command\":\"ignored\"}", &mut bytes).unwrap();

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        assert_eq!(reader.read_frame().unwrap(), Decoded::EndOfStream);
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![b'x'; 64 * 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&payload])));
        match reader.read_frame().unwrap() {
            Decoded::Frame(frame) => assert_eq!(frame.as_ref(), payload.as_slice()),
            Decoded::EndOfStream => panic!("unexpected end of stream"),
        }
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow"]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);
        assert_eq!(
            reader.read_frame().unwrap(),
            Decoded::Frame(Bytes::from_static(b"slow"))
        );
    }

    #[test]
    fn empty_stream_is_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(reader.read_frame().unwrap(), Decoded::EndOfStream);
    }

    #[test]
    fn closed_inside_header_is_truncated() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x00, 0x00]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 2
            }
        ));
    }

    #[test]
    fn closed_inside_payload_is_truncated() {
        let mut partial = BytesMut::new();
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 20,
                received: 13
            }
        ));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: Some(16),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn read_object_parses_json() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[
            br#"{"command":"pong","id":1,"ts":"10"}"#,
            b"not json",
        ])));

        let object = reader.read_object().unwrap().unwrap();
        assert_eq!(object["command"], "pong");
        assert_eq!(object["id"], 1);

        assert!(matches!(
            reader.read_object(),
            Err(FrameError::Malformed(_))
        ));
        assert!(reader.read_object().unwrap().is_none());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Yields `first` as an error once, then serves `bytes` in full.
    struct ErrThenData {
        first: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ErrThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.first.take() {
                return Err(std::io::Error::from(kind));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn would_block_propagates_as_timeout() {
        let mut framed = FrameReader::new(ErrThenData {
            first: Some(ErrorKind::WouldBlock),
            bytes: wire(&[b"ok"]),
            pos: 0,
        });
        let err = framed.read_frame().unwrap_err();
        assert!(err.is_timeout());

        // The next call still delivers the frame.
        assert_eq!(
            framed.read_frame().unwrap(),
            Decoded::Frame(Bytes::from_static(b"ok"))
        );
    }

    #[test]
    fn interrupted_read_retries() {
        let mut framed = FrameReader::new(ErrThenData {
            first: Some(ErrorKind::Interrupted),
            bytes: wire(&[b"ok"]),
            pos: 0,
        });
        assert_eq!(
            framed.read_frame().unwrap(),
            Decoded::Frame(Bytes::from_static(b"ok"))
        );
    }

    #[test]
    #[cfg(unix)]
    fn timeout_mid_frame_keeps_partial_bytes() {
        use std::io::Write;
        use std::time::Duration;

        let (mut daemon, client) = IpcStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_ipc(client, cfg).unwrap();

        let frame = wire(&[b"{\"command\":\"pong\"}"]);
        daemon.write_all(&frame[..6]).unwrap();
        assert!(reader.read_frame().unwrap_err().is_timeout());

        daemon.write_all(&frame[6..]).unwrap();
        assert_eq!(
            reader.read_frame().unwrap(),
            Decoded::Frame(Bytes::from_static(b"{\"command\":\"pong\"}"))
        );
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_ipc_stream_uds() {
        let dir = std::env::temp_dir().join(format!(
            "clfsctl-frame-uds-roundtrip-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("test.sock");
        let listener = clfsctl_transport::UnixDomainSocket::bind(&sock_path).unwrap();

        let daemon = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream);
            writer.send(br#"{"version":"1.0"}"#).unwrap();
            writer.send_end_of_stream().unwrap();
        });

        let stream = clfsctl_transport::UnixDomainSocket::connect(&sock_path).unwrap();
        let mut reader = FrameReader::new(stream);
        let info = reader.read_object().unwrap().unwrap();
        assert_eq!(info["version"], "1.0");
        assert!(reader.read_object().unwrap().is_none());

        daemon.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
