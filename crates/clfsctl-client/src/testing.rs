//! Scripted daemon side of a connection, for unit tests.

use clfsctl_frame::Object;
#[cfg(unix)]
use clfsctl_frame::{FrameReader, FrameWriter};
#[cfg(unix)]
use clfsctl_transport::IpcStream;
use serde_json::{json, Value};

#[cfg(unix)]
use crate::config::ClientConfig;
#[cfg(unix)]
use crate::connection::Connection;

pub(crate) fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        other => panic!("not an object: {other}"),
    }
}

pub(crate) fn handshake() -> Object {
    object(json!({"command": "hello", "version": "1.0", "bucket": "media"}))
}

/// The daemon end of a socket pair.
#[cfg(unix)]
pub(crate) struct FakeDaemon {
    pub reader: FrameReader<IpcStream>,
    pub writer: FrameWriter<IpcStream>,
}

#[cfg(unix)]
impl FakeDaemon {
    pub fn send(&mut self, value: Value) {
        self.writer.send_object(&object(value)).unwrap();
    }

    pub fn send_raw(&mut self, payload: &[u8]) {
        self.writer.send(payload).unwrap();
    }

    pub fn end(&mut self) {
        self.writer.send_end_of_stream().unwrap();
    }

    pub fn recv(&mut self) -> Object {
        self.reader.read_object().unwrap().expect("client closed early")
    }
}

/// A daemon that has not sent anything yet, and the client's stream.
#[cfg(unix)]
pub(crate) fn socket_pair() -> (FakeDaemon, IpcStream) {
    let (daemon, client) = IpcStream::pair().unwrap();
    let reader = FrameReader::new(daemon.try_clone().unwrap());
    let writer = FrameWriter::new(daemon);
    (FakeDaemon { reader, writer }, client)
}

/// A connection that has completed the handshake, and its daemon.
#[cfg(unix)]
pub(crate) fn connected() -> (FakeDaemon, Connection) {
    let (mut daemon, client) = socket_pair();
    daemon.send(Value::Object(handshake()));
    let connection = Connection::from_stream(client, &ClientConfig::default()).unwrap();
    (daemon, connection)
}
