use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clfsctl_frame::Object;
use serde_json::Value;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::correlator;
use crate::deadline::Deadline;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::message::{Fsck, FsckReply, Message, Ping};

/// A control client for one daemon.
///
/// Couples a [`Connection`] with a [`Dispatcher`] that already knows how to
/// handle `pong` and `fsck_reply`. Requests return their id; replies are
/// collected with [`Client::wait_for`] while everything else that arrives on
/// the way is dispatched.
///
/// ```no_run
/// let mut client = clfsctl_client::Client::connect("/tmp/s3clfs-media.sock")?;
/// let id = client.ping()?;
/// client.wait_for(id)?;
/// # Ok::<(), clfsctl_client::ClientError>(())
/// ```
pub struct Client {
    connection: Connection,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl Client {
    /// Connect using the system clock and default settings.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, &ClientConfig::default(), Arc::new(SystemClock))
    }

    pub fn connect_with(
        path: impl AsRef<Path>,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let connection = Connection::connect_with_config(path, config)?;
        Ok(Self::from_connection(connection, clock))
    }

    /// Wrap an established connection. `clock` stamps pings and measures pongs.
    pub fn from_connection(connection: Connection, clock: Arc<dyn Clock>) -> Self {
        let dispatcher = Dispatcher::with_builtins(Arc::clone(&clock));
        Self {
            connection,
            dispatcher,
            clock,
        }
    }

    /// The daemon's handshake message.
    pub fn info(&self) -> &Object {
        self.connection.info()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Send a ping stamped with the current time. Returns its id.
    pub fn ping(&mut self) -> Result<u64> {
        let id = self.connection.next_id()?;
        let ts = self.clock.now_micros().to_string();
        self.connection.send(&Message::Ping(Ping { ts, id }))?;
        Ok(id)
    }

    /// Ask the daemon to start a consistency check. Returns its id, which
    /// the daemon's `fsck_reply` progress messages carry.
    pub fn fsck(&mut self) -> Result<u64> {
        let id = self.connection.next_id()?;
        self.connection.send(&Message::Fsck(Fsck { id }))?;
        Ok(id)
    }

    /// Send any command with a fresh id. An `id` in `fields` is replaced.
    pub fn send_command(&mut self, command: &str, mut fields: Object) -> Result<u64> {
        let id = self.connection.next_id()?;
        fields.insert("id".to_string(), Value::from(id));
        self.connection.send(&Message::Other {
            command: command.to_string(),
            fields,
        })?;
        Ok(id)
    }

    /// Block until the message with `id` arrives, dispatching everything
    /// before it. `None` if the daemon ends the stream first.
    pub fn wait_for(&mut self, id: u64) -> Result<Option<Message>> {
        correlator::wait_for(&mut self.connection, &mut self.dispatcher, id, None)
    }

    /// Like [`Client::wait_for`], failing with [`ClientError::Timeout`]
    /// after `timeout`.
    pub fn wait_for_with_timeout(&mut self, id: u64, timeout: Duration) -> Result<Option<Message>> {
        let deadline = Deadline::after(timeout);
        correlator::wait_for(&mut self.connection, &mut self.dispatcher, id, Some(&deadline))
    }

    /// Dispatch everything until the daemon ends the stream.
    pub fn run_forever(&mut self) -> Result<()> {
        correlator::run_forever(&mut self.connection, &mut self.dispatcher, None)
    }

    /// Dispatch for at most `timeout`. Returns `Ok` if the stream ended
    /// first and [`ClientError::Timeout`] otherwise.
    pub fn run_for(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after(timeout);
        correlator::run_forever(&mut self.connection, &mut self.dispatcher, Some(&deadline))
    }

    /// Dispatch until `stop` accepts a message, and return that message.
    pub fn run_until(
        &mut self,
        timeout: Option<Duration>,
        stop: impl FnMut(&Message) -> bool,
    ) -> Result<Option<Message>> {
        let deadline = timeout.map(Deadline::after);
        correlator::run_until(
            &mut self.connection,
            &mut self.dispatcher,
            deadline.as_ref(),
            stop,
        )
    }

    /// Follow the check started as request `id` until it completes or
    /// panics, and return that final report.
    ///
    /// Intermediate reports go through the dispatcher like any other
    /// message. `None` if the daemon ends the stream first.
    pub fn follow_fsck(&mut self, id: u64, timeout: Option<Duration>) -> Result<Option<FsckReply>> {
        debug!(id, "following fsck");
        let last = self.run_until(timeout, |message| match message {
            Message::FsckReply(reply) => reply.id == id && reply.status.is_terminal(),
            _ => false,
        })?;
        match last {
            Some(Message::FsckReply(reply)) => Ok(Some(reply)),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
