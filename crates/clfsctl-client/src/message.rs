//! Typed control messages.
//!
//! On the wire every message is a flat JSON object with a string `command`
//! field. Commands this client understands parse into their own variant;
//! anything else is kept as [`Message::Other`] with its raw fields so it can
//! still be routed and inspected.

use std::fmt;

use clfsctl_frame::{FrameError, Object};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → daemon: liveness check.
pub const COMMAND_PING: &str = "ping";
/// Daemon → client: reply to a ping, echoing its `ts`.
pub const COMMAND_PONG: &str = "pong";
/// Client → daemon: start a filesystem consistency check.
pub const COMMAND_FSCK: &str = "fsck";
/// Daemon → client: progress of a running consistency check.
pub const COMMAND_FSCK_REPLY: &str = "fsck_reply";

const COMMAND_FIELD: &str = "command";

/// A liveness check. `ts` is the sender's clock in microseconds since the
/// Unix epoch, encoded as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub ts: String,
    pub id: u64,
}

/// The daemon's answer to a [`Ping`], carrying the same `id` and `ts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub ts: String,
    pub id: u64,
}

/// Request to run a consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fsck {
    pub id: u64,
}

/// One progress report from a consistency check started with [`Fsck`].
///
/// Status-specific fields (`directory`, `found_inodes`, `parent_ino`, `ino`,
/// `type`) are kept in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsckReply {
    pub id: u64,
    pub status: FsckStatus,
    #[serde(flatten)]
    pub details: Object,
}

/// Phase or finding reported by a running consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FsckStatus {
    Initializing,
    Started,
    Running,
    InvalidInode,
    InvalidCurdir,
    InvalidInodeType,
    Complete,
    Panic,
    /// A status this client does not know about yet.
    Other(String),
}

impl FsckStatus {
    /// The wire spelling of this status.
    pub fn as_str(&self) -> &str {
        match self {
            FsckStatus::Initializing => "initializing",
            FsckStatus::Started => "started",
            FsckStatus::Running => "running",
            FsckStatus::InvalidInode => "invalid_inode",
            FsckStatus::InvalidCurdir => "invalid_curdir",
            FsckStatus::InvalidInodeType => "invalid_inode_type",
            FsckStatus::Complete => "complete",
            FsckStatus::Panic => "panic",
            FsckStatus::Other(other) => other,
        }
    }

    /// True once the check has stopped, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FsckStatus::Complete | FsckStatus::Panic)
    }

    /// True for statuses that report a damaged inode.
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            FsckStatus::InvalidInode | FsckStatus::InvalidCurdir | FsckStatus::InvalidInodeType
        )
    }
}

impl From<String> for FsckStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "initializing" => FsckStatus::Initializing,
            "started" => FsckStatus::Started,
            "running" => FsckStatus::Running,
            "invalid_inode" => FsckStatus::InvalidInode,
            "invalid_curdir" => FsckStatus::InvalidCurdir,
            "invalid_inode_type" => FsckStatus::InvalidInodeType,
            "complete" => FsckStatus::Complete,
            "panic" => FsckStatus::Panic,
            _ => FsckStatus::Other(value),
        }
    }
}

impl From<FsckStatus> for String {
    fn from(value: FsckStatus) -> Self {
        match value {
            FsckStatus::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FsckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control message exchanged after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ping(Ping),
    Pong(Pong),
    Fsck(Fsck),
    FsckReply(FsckReply),
    /// Any command without a typed variant, with its remaining fields.
    Other { command: String, fields: Object },
}

impl Message {
    /// The `command` name this message travels under.
    pub fn command(&self) -> &str {
        match self {
            Message::Ping(_) => COMMAND_PING,
            Message::Pong(_) => COMMAND_PONG,
            Message::Fsck(_) => COMMAND_FSCK,
            Message::FsckReply(_) => COMMAND_FSCK_REPLY,
            Message::Other { command, .. } => command,
        }
    }

    /// The request id this message carries, if any.
    ///
    /// Untyped messages may carry the id as a number or as a decimal string.
    pub fn id(&self) -> Option<u64> {
        match self {
            Message::Ping(ping) => Some(ping.id),
            Message::Pong(pong) => Some(pong.id),
            Message::Fsck(fsck) => Some(fsck.id),
            Message::FsckReply(reply) => Some(reply.id),
            Message::Other { fields, .. } => match fields.get("id")? {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        }
    }

    /// Parse a decoded JSON object.
    ///
    /// Fails with [`FrameError::MissingCommand`] if there is no string
    /// `command`, and with [`FrameError::Malformed`] if a known command has
    /// missing or ill-typed fields.
    pub fn from_object(mut object: Object) -> Result<Self, FrameError> {
        let command = match object.shift_remove(COMMAND_FIELD) {
            Some(Value::String(command)) => command,
            _ => return Err(FrameError::MissingCommand),
        };

        let message = match command.as_str() {
            COMMAND_PING => Message::Ping(typed(object)?),
            COMMAND_PONG => Message::Pong(typed(object)?),
            COMMAND_FSCK => Message::Fsck(typed(object)?),
            COMMAND_FSCK_REPLY => Message::FsckReply(typed(object)?),
            _ => Message::Other {
                command,
                fields: object,
            },
        };
        Ok(message)
    }

    /// Flatten into a JSON object with `command` as the first field.
    pub fn to_object(&self) -> serde_json::Result<Object> {
        let fields = match self {
            Message::Ping(ping) => fields_of(ping)?,
            Message::Pong(pong) => fields_of(pong)?,
            Message::Fsck(fsck) => fields_of(fsck)?,
            Message::FsckReply(reply) => fields_of(reply)?,
            Message::Other { fields, .. } => fields.clone(),
        };

        let mut object = Object::with_capacity(fields.len() + 1);
        object.insert(
            COMMAND_FIELD.to_string(),
            Value::String(self.command().to_string()),
        );
        for (key, value) in fields {
            if key != COMMAND_FIELD {
                object.insert(key, value);
            }
        }
        Ok(object)
    }
}

fn typed<T: DeserializeOwned>(object: Object) -> Result<T, FrameError> {
    Ok(serde_json::from_value(Value::Object(object))?)
}

fn fields_of<T: Serialize>(value: &T) -> serde_json::Result<Object> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object),
        other => Err(serde::ser::Error::custom(format!(
            "expected message fields to serialize as an object, got {other}"
        ))),
    }
}
