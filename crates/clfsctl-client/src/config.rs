use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clfsctl_frame::FrameConfig;

/// Connection settings.
///
/// The defaults impose no limits at all: payloads are unbounded and every
/// read, including the handshake, blocks until the daemon answers.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Payload limit and per-call stream timeouts.
    pub frame: FrameConfig,
    /// Upper bound on waiting for the daemon's handshake message.
    pub handshake_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }
}

/// Control socket the daemon creates for `bucket` when it has no cache path:
/// `<tmp>/s3clfs-<bucket>.sock`.
pub fn socket_path_for_bucket(bucket: &str) -> PathBuf {
    std::env::temp_dir().join(format!("s3clfs-{bucket}.sock"))
}

/// Control socket the daemon creates next to its cache: `<cache_path>.sock`.
pub fn socket_path_for_cache(cache_path: &Path) -> PathBuf {
    let mut path = OsString::from(cache_path.as_os_str());
    path.push(".sock");
    PathBuf::from(path)
}
