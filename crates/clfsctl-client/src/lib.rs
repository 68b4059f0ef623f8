//! Control-channel client for the S3ClFS daemon.
//!
//! This is the "just works" layer. Connect to the daemon's control socket,
//! read its handshake, send pings and fsck requests, and route whatever the
//! daemon sends back to per-command handlers while waiting for replies.

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod deadline;
pub mod dispatcher;
pub mod error;
pub mod message;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{socket_path_for_bucket, socket_path_for_cache, ClientConfig};
pub use connection::{Connection, ConnectionState, Received};
pub use correlator::IdCounter;
pub use deadline::Deadline;
pub use dispatcher::{
    Dispatch, Dispatcher, FsckReplyHandler, Handler, Outcome, PongHandler, PongLag,
};
pub use error::{ClientError, Result};
pub use message::{
    Fsck, FsckReply, FsckStatus, Message, Ping, Pong, COMMAND_FSCK, COMMAND_FSCK_REPLY,
    COMMAND_PING, COMMAND_PONG,
};
