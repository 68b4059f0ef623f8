//! JSON object payloads.
//!
//! The control protocol only ever carries flat JSON objects, so payloads are
//! decoded into an [`Object`] and anything else is rejected.

use serde_json::Value;

use crate::error::{FrameError, Result};

/// A decoded message payload: field name to value, in wire order.
pub type Object = serde_json::Map<String, Value>;

/// Serialize an object into a frame payload.
pub fn encode_object(object: &Object) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(object)?)
}

/// Parse a frame payload as a JSON object.
pub fn decode_object(payload: &[u8]) -> Result<Object> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(object) => Ok(object),
        _ => Err(FrameError::NotAnObject),
    }
}
