//! A stand-in for the S3ClFS daemon's control socket.
//!
//! Answers pings with pongs and runs a short scripted fsck, which is enough
//! to try every `clfsctl` subcommand without a mounted filesystem.
//!
//! ```text
//! cargo run -p clfsctl --features cli --example fake-daemon -- /tmp/fake.sock
//! clfsctl --socket /tmp/fake.sock ping --count 3
//! ```

use std::time::Duration;

use clfsctl::frame::{Decoded, FrameReader, FrameWriter, Object};
use clfsctl::transport::{IpcStream, UnixDomainSocket};
use serde_json::{json, Value};

fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        _ => Object::new(),
    }
}

fn serve(stream: IpcStream) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = FrameReader::new(stream.try_clone()?);
    let mut writer = FrameWriter::new(stream);
    writer.send_object(&object(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "bucket": "fake",
        "pid": std::process::id(),
    })))?;

    loop {
        let payload = match reader.read_frame()? {
            Decoded::Frame(payload) => payload,
            Decoded::EndOfStream => return Ok(()),
        };
        let request: Value = serde_json::from_slice(&payload)?;
        let id = request["id"].clone();
        match request["command"].as_str() {
            Some("ping") => {
                writer.send_object(&object(json!({"command": "pong", "id": id, "ts": request["ts"]})))?;
            }
            Some("fsck") => {
                for (status, extra) in [
                    ("initializing", json!({})),
                    ("started", json!({"directory": "/"})),
                    ("running", json!({"found_inodes": 128})),
                    ("complete", json!({})),
                ] {
                    std::thread::sleep(Duration::from_millis(100));
                    let mut reply = object(json!({"command": "fsck_reply", "id": id, "status": status}));
                    reply.extend(object(extra));
                    writer.send_object(&reply)?;
                }
            }
            other => eprintln!("ignoring command {other:?}"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/s3clfs-fake.sock".to_string());
    let listener = UnixDomainSocket::bind(&path)?;
    eprintln!("listening on {path}");

    loop {
        let stream = listener.accept()?;
        if let Err(err) = serve(stream) {
            eprintln!("client session ended: {err}");
        }
    }
}
