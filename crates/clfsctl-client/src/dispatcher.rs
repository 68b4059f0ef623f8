//! Routing of incoming messages to per-command handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::message::{FsckStatus, Message, COMMAND_FSCK_REPLY, COMMAND_PONG};

/// What a handler made of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handled; nothing further to report.
    Done,
    /// A pong arrived; round-trip lag of the matching ping.
    Lag(PongLag),
    /// A consistency check reported progress.
    Fsck { id: u64, status: FsckStatus },
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A handler was registered for the command.
    Handled(Outcome),
    /// No handler; the message went to the fallback.
    Unrecognized,
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

/// Side-effecting reaction to one kind of message.
pub trait Handler {
    fn handle(&mut self, message: &Message) -> Outcome;
}

impl<F> Handler for F
where
    F: FnMut(&Message) -> Outcome,
{
    fn handle(&mut self, message: &Message) -> Outcome {
        self(message)
    }
}

type Fallback = Box<dyn FnMut(&Message)>;

/// Routes messages by their `command` field.
///
/// The handler table is explicit: a command is either registered or it goes
/// to the fallback, which by default logs the whole message. Unrecognized
/// commands are never an error.
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn Handler>>,
    fallback: Fallback,
}

impl Dispatcher {
    /// A dispatcher with no handlers and the logging fallback.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Box::new(log_unrecognized),
        }
    }

    /// A dispatcher with the built-in `pong` and `fsck_reply` handlers.
    pub fn with_builtins(clock: Arc<dyn Clock>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(COMMAND_PONG, PongHandler::new(clock));
        dispatcher.register(COMMAND_FSCK_REPLY, FsckReplyHandler);
        dispatcher
    }

    /// Register `handler` for `command`, returning the one it replaces.
    pub fn register(
        &mut self,
        command: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Option<Box<dyn Handler>> {
        self.handlers.insert(command.into(), Box::new(handler))
    }

    /// Remove the handler for `command`.
    pub fn unregister(&mut self, command: &str) -> Option<Box<dyn Handler>> {
        self.handlers.remove(command)
    }

    pub fn is_registered(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Replace the fallback used for unrecognized commands.
    pub fn set_fallback(&mut self, fallback: impl FnMut(&Message) + 'static) {
        self.fallback = Box::new(fallback);
    }

    /// Route one message.
    pub fn dispatch(&mut self, message: &Message) -> Dispatch {
        match self.handlers.get_mut(message.command()) {
            Some(handler) => Dispatch::Handled(handler.handle(message)),
            None => {
                (self.fallback)(message);
                Dispatch::Unrecognized
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("commands", &commands)
            .finish_non_exhaustive()
    }
}

fn log_unrecognized(message: &Message) {
    warn!(command = message.command(), id = ?message.id(), ?message, "unrecognized command");
}

/// Round-trip time of a ping, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongLag {
    pub micros: i64,
}

impl PongLag {
    /// Lag between a ping sent at `sent_micros` and its pong seen at `now_micros`.
    pub fn between(sent_micros: i64, now_micros: i64) -> Self {
        Self {
            micros: now_micros.saturating_sub(sent_micros),
        }
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.micros as f64 / 1000.0
    }
}

impl fmt::Display for PongLag {
    /// Milliseconds with three decimals, e.g. `2.500ms`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}

/// Computes ping lag from the `ts` a pong echoes back.
pub struct PongHandler {
    clock: Arc<dyn Clock>,
}

impl PongHandler {
    /// `clock` must be the one the pings were stamped with.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Handler for PongHandler {
    fn handle(&mut self, message: &Message) -> Outcome {
        let Message::Pong(pong) = message else {
            return Outcome::Done;
        };
        let now = self.clock.now_micros();
        match pong.ts.trim().parse::<i64>() {
            Ok(sent) => {
                let lag = PongLag::between(sent, now);
                info!(id = pong.id, %lag, "pong received");
                Outcome::Lag(lag)
            }
            Err(err) => {
                warn!(id = pong.id, ts = %pong.ts, error = %err, "pong carries an unreadable timestamp");
                Outcome::Done
            }
        }
    }
}

/// Logs consistency-check progress.
pub struct FsckReplyHandler;

impl Handler for FsckReplyHandler {
    fn handle(&mut self, message: &Message) -> Outcome {
        let Message::FsckReply(reply) = message else {
            return Outcome::Done;
        };
        if reply.status.is_finding() || reply.status == FsckStatus::Panic {
            warn!(id = reply.id, status = %reply.status, details = ?reply.details, "fsck");
        } else {
            info!(id = reply.id, status = %reply.status, "fsck");
        }
        Outcome::Fsck {
            id: reply.id,
            status: reply.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::clock::ManualClock;
    use crate::message::{FsckReply, Pong};
    use crate::testing::object;

    fn pong(id: u64, ts: &str) -> Message {
        Message::Pong(Pong {
            ts: ts.to_string(),
            id,
        })
    }

    fn frobnicate() -> Message {
        Message::Other {
            command: "frobnicate".to_string(),
            fields: object(json!({"id": 1})),
        }
    }

    #[test]
    fn pong_lag_is_reported_in_milliseconds() {
        let t = 1_700_000_000_000_000;
        let clock = Arc::new(ManualClock::new(t + 2_500));
        let mut dispatcher = Dispatcher::with_builtins(clock);

        let outcome = dispatcher.dispatch(&pong(1, &t.to_string()));
        let Dispatch::Handled(Outcome::Lag(lag)) = outcome else {
            panic!("expected lag, got {outcome:?}");
        };
        assert_eq!(lag.micros, 2_500);
        assert_eq!(lag.to_string(), "2.500ms");
    }

    #[test]
    fn lag_formatting_keeps_three_decimals() {
        assert_eq!(PongLag::between(0, 1).to_string(), "0.001ms");
        assert_eq!(PongLag::between(0, 1_234_567).to_string(), "1234.567ms");
        assert_eq!(PongLag::between(10, 0).to_string(), "-0.010ms");
    }

    #[test]
    fn pong_with_unreadable_timestamp_is_still_handled() {
        let mut dispatcher = Dispatcher::with_builtins(Arc::new(ManualClock::new(0)));
        assert_eq!(
            dispatcher.dispatch(&pong(1, "yesterday")),
            Dispatch::Handled(Outcome::Done)
        );
    }

    #[test]
    fn fsck_reply_reports_status() {
        let mut dispatcher = Dispatcher::with_builtins(Arc::new(ManualClock::new(0)));
        let reply = Message::FsckReply(FsckReply {
            id: 3,
            status: FsckStatus::Running,
            details: object(json!({"found_inodes": 120})),
        });
        assert_eq!(
            dispatcher.dispatch(&reply),
            Dispatch::Handled(Outcome::Fsck {
                id: 3,
                status: FsckStatus::Running
            })
        );
    }

    #[test]
    fn unknown_command_goes_to_fallback() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);

        let mut dispatcher = Dispatcher::with_builtins(Arc::new(ManualClock::new(0)));
        dispatcher.set_fallback(move |message: &Message| {
            log.borrow_mut().push(message.command().to_string())
        });

        assert_eq!(dispatcher.dispatch(&frobnicate()), Dispatch::Unrecognized);
        assert_eq!(*seen.borrow(), vec!["frobnicate".to_string()]);
    }

    #[test]
    fn default_fallback_does_not_panic() {
        let mut dispatcher = Dispatcher::new();
        let result = dispatcher.dispatch(&frobnicate());
        assert_eq!(result, Dispatch::Unrecognized);
        assert!(!result.is_handled());
    }

    #[traced_test]
    #[test]
    fn default_fallback_logs_the_whole_message() {
        let mut dispatcher = Dispatcher::new();
        let message = Message::Other {
            command: "frobnicate".to_string(),
            fields: object(json!({"id": 1, "volume": "cold-archive"})),
        };
        assert_eq!(dispatcher.dispatch(&message), Dispatch::Unrecognized);
        assert!(logs_contain("unrecognized command"));
        assert!(logs_contain("cold-archive"));
    }

    #[test]
    fn register_replaces_and_unregister_removes() {
        let mut dispatcher = Dispatcher::with_builtins(Arc::new(ManualClock::new(0)));
        assert!(dispatcher.is_registered("pong"));

        let previous = dispatcher.register("pong", |_: &Message| Outcome::Done);
        assert!(previous.is_some());
        assert_eq!(
            dispatcher.dispatch(&pong(1, "0")),
            Dispatch::Handled(Outcome::Done)
        );

        assert!(dispatcher.unregister("pong").is_some());
        assert_eq!(dispatcher.dispatch(&pong(1, "0")), Dispatch::Unrecognized);
    }

    #[test]
    fn custom_handler_for_untyped_command() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("frobnicate", |message: &Message| {
            assert_eq!(message.id(), Some(1));
            Outcome::Done
        });
        assert!(dispatcher.dispatch(&frobnicate()).is_handled());
        assert!(format!("{dispatcher:?}").contains("frobnicate"));
    }
}
