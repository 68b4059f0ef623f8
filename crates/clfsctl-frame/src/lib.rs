//! Length-prefixed message framing for the S3ClFS control channel.
//!
//! Every message on the wire is:
//! - a 4-byte big-endian payload length
//! - exactly that many bytes of UTF-8 JSON (always an object)
//!
//! A length of zero is not an empty message. It is the end-of-stream
//! sentinel, and readers surface it as [`Decoded::EndOfStream`].

pub mod codec;
pub mod error;
pub mod json;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_end_of_stream, encode_frame, Decoded, FrameConfig, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use json::{decode_object, encode_object, Object};
pub use reader::FrameReader;
pub use writer::FrameWriter;
