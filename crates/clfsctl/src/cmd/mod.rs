use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use clfsctl_client::{
    socket_path_for_bucket, socket_path_for_cache, Client, ClientConfig, ClientError, Message,
    SystemClock,
};
use clfsctl_transport::TransportError;
use tracing::debug;

use crate::exit::{client_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

pub mod fsck;
pub mod info;
pub mod ping;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print the daemon's handshake.
    Info(InfoArgs),
    /// Measure round-trip lag to the daemon.
    Ping(PingArgs),
    /// Start a filesystem consistency check.
    Fsck(FsckArgs),
    /// Print every message the daemon sends until it closes the stream.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, target: &Target, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, target, format),
        Command::Ping(args) => ping::run(args, target, format),
        Command::Fsck(args) => fsck::run(args, target, format),
        Command::Watch(args) => watch::run(args, target, format),
        Command::Version(args) => version::run(args),
    }
}

/// Which daemon to talk to. Resolved in the same order the daemon picks its
/// own socket: explicit path, then cache path, then bucket.
#[derive(Args, Debug, Default)]
pub struct Target {
    /// Control socket path.
    #[arg(long, value_name = "PATH", env = "CLFSCTL_SOCKET", global = true)]
    pub socket: Option<PathBuf>,

    /// Daemon cache path; the socket is `<PATH>.sock`.
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_path: Option<PathBuf>,

    /// Bucket name; the socket is `<tmp>/s3clfs-<BUCKET>.sock`.
    #[arg(long, value_name = "BUCKET", env = "CLFSCTL_BUCKET", global = true)]
    pub bucket: Option<String>,

    /// Time allowed for connecting and receiving the handshake (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    pub connect_timeout: String,

    /// Keep retrying, up to --connect-timeout, while the socket is missing
    /// or refuses connections. Without it a failed connect is final.
    #[arg(long, global = true)]
    pub wait: bool,
}

impl Target {
    pub fn socket_path(&self) -> CliResult<PathBuf> {
        if let Some(socket) = &self.socket {
            return Ok(socket.clone());
        }
        if let Some(cache_path) = &self.cache_path {
            return Ok(socket_path_for_cache(cache_path));
        }
        if let Some(bucket) = &self.bucket {
            return Ok(socket_path_for_bucket(bucket));
        }
        Err(CliError::new(
            USAGE,
            "no daemon selected: pass --socket, --cache-path or --bucket",
        ))
    }

    /// Connect and read the handshake. With `--wait`, a missing or refusing
    /// socket is retried until the connect timeout runs out.
    pub fn connect(&self, format: OutputFormat) -> CliResult<Client> {
        let path = self.socket_path()?;
        let timeout = parse_duration(&self.connect_timeout)?;
        let config = ClientConfig::default().with_handshake_timeout(timeout);
        let mut client = if self.wait {
            connect_with_retry(&path, &config, timeout)?
        } else {
            connect_once(&path, &config)?
        };
        client
            .dispatcher_mut()
            .set_fallback(move |message: &Message| print_message(message, format));
        Ok(client)
    }
}

fn connect_once(path: &Path, config: &ClientConfig) -> CliResult<Client> {
    let client = Client::connect_with(path, config, Arc::new(SystemClock))
        .map_err(|err| client_error("connect failed", err))?;
    debug!(path = %path.display(), "connected");
    Ok(client)
}

fn connect_with_retry(path: &Path, config: &ClientConfig, timeout: Duration) -> CliResult<Client> {
    let start = Instant::now();
    loop {
        match Client::connect_with(path, config, Arc::new(SystemClock)) {
            Ok(client) => {
                debug!(path = %path.display(), "connected");
                return Ok(client);
            }
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(client_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!(
                            "connect to {} timed out after {timeout:?}: {err}",
                            path.display()
                        ),
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn is_retryable_connect_error(err: &ClientError) -> bool {
    match err {
        ClientError::Transport(TransportError::Connect { source, .. }) => {
            source.kind() == std::io::ErrorKind::NotFound
                || source.kind() == std::io::ErrorKind::ConnectionRefused
        }
        _ => false,
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Number of pings to send.
    #[arg(long, short = 'c', default_value = "1")]
    pub count: u32,
    /// Pause between pings (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Maximum time to wait for each pong.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct FsckArgs {
    /// Keep reading progress until the check completes or panics.
    #[arg(long)]
    pub follow: bool,
    /// With --follow, give up after this long. Default: wait indefinitely.
    #[arg(long, requires = "follow")]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
