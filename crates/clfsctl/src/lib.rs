//! Control client for the S3ClFS storage daemon.
//!
//! The daemon listens on a Unix socket and speaks length-prefixed JSON
//! messages. This crate bundles the layers needed to talk to it.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket stream with timeouts and peer credentials
//! - [`frame`]: Length-prefixed JSON framing with an end-of-stream sentinel
//! - [`client`]: Handshake, dispatch, reply correlation (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use clfsctl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use clfsctl_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use clfsctl_client::*;
}
