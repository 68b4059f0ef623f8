//! Local stream transport for the S3ClFS control channel.
//!
//! The daemon listens on a filesystem-path Unix domain socket. This crate
//! opens that socket and hands back an [`IpcStream`] that the framing layer
//! reads from and writes to. Binding is provided too, mostly so that tests
//! and tooling can stand up a fake daemon.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
