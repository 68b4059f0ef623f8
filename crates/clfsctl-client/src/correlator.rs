//! Request ids and reply matching.
//!
//! Every message received while waiting is dispatched in arrival order
//! before the wait looks at its id, so notifications that arrive ahead of
//! the awaited reply are never skipped.

use tracing::debug;

use crate::connection::{Connection, Received};
use crate::deadline::Deadline;
use crate::dispatcher::Dispatcher;
use crate::error::{ClientError, Result};
use crate::message::Message;

/// Strictly increasing request ids for one connection.
///
/// Starts at 0 and pre-increments, so the first id handed out is 1. Ids are
/// never reused and never wrap.
#[derive(Debug, Default)]
pub struct IdCounter {
    last: u64,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Result<u64> {
        self.last = self
            .last
            .checked_add(1)
            .ok_or(ClientError::IdSpaceExhausted)?;
        Ok(self.last)
    }

    /// The last id handed out, or 0 if none was.
    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Receive and dispatch messages until one matches `stop`.
///
/// Returns the matching message, or `None` if the stream ends first.
pub fn run_until(
    connection: &mut Connection,
    dispatcher: &mut Dispatcher,
    deadline: Option<&Deadline>,
    mut stop: impl FnMut(&Message) -> bool,
) -> Result<Option<Message>> {
    loop {
        let message = match connection.receive_before(deadline)? {
            Received::Message(message) => message,
            Received::EndOfStream => return Ok(None),
        };
        dispatcher.dispatch(&message);
        if stop(&message) {
            return Ok(Some(message));
        }
    }
}

/// Wait for the first message whose id is `target`.
///
/// Everything received before it (and the match itself) goes through the
/// dispatcher first. Returns `None` if the stream ends without a match.
pub fn wait_for(
    connection: &mut Connection,
    dispatcher: &mut Dispatcher,
    target: u64,
    deadline: Option<&Deadline>,
) -> Result<Option<Message>> {
    debug!(id = target, "waiting for reply");
    run_until(connection, dispatcher, deadline, |message| {
        message.id() == Some(target)
    })
}

/// Dispatch everything until the stream ends.
pub fn run_forever(
    connection: &mut Connection,
    dispatcher: &mut Dispatcher,
    deadline: Option<&Deadline>,
) -> Result<()> {
    run_until(connection, dispatcher, deadline, |_| false).map(|_| ())
}

#[cfg(all(test, unix))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::dispatcher::Outcome;
    use crate::testing::connected;

    /// A dispatcher that records the id of every message it routes.
    fn recording_dispatcher() -> (Dispatcher, Rc<RefCell<Vec<Option<u64>>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let log = Rc::clone(&seen);
        dispatcher.set_fallback(move |message: &Message| log.borrow_mut().push(message.id()));
        let log = Rc::clone(&seen);
        dispatcher.register("pong", move |message: &Message| {
            log.borrow_mut().push(message.id());
            Outcome::Done
        });
        (dispatcher, seen)
    }

    #[test]
    fn ids_strictly_increase_from_one() {
        let mut ids = IdCounter::new();
        assert_eq!(ids.last(), 0);
        let issued: Vec<u64> = (0..100).map(|_| ids.next_id().unwrap()).collect();
        assert_eq!(issued.first(), Some(&1));
        assert!(issued.windows(2).all(|pair| pair[1] > pair[0]));
        assert_eq!(ids.last(), 100);
    }

    #[test]
    fn id_space_exhaustion_is_an_error() {
        let mut ids = IdCounter { last: u64::MAX - 1 };
        assert_eq!(ids.next_id().unwrap(), u64::MAX);
        assert!(matches!(ids.next_id(), Err(ClientError::IdSpaceExhausted)));
        assert_eq!(ids.last(), u64::MAX);
    }

    #[test]
    fn wait_for_returns_first_match_after_dispatching_earlier_messages() {
        let (mut daemon, mut connection) = connected();
        for id in [5, 7, 3, 9, 3] {
            daemon.send(json!({"command": "notice", "id": id, "seq": id * 10}));
        }
        daemon.end();

        let (mut dispatcher, seen) = recording_dispatcher();
        let found = wait_for(&mut connection, &mut dispatcher, 3, None)
            .unwrap()
            .unwrap();

        assert_eq!(found.id(), Some(3));
        let Message::Other { fields, .. } = &found else {
            panic!("expected untyped message");
        };
        assert_eq!(fields["seq"], 30);
        assert_eq!(*seen.borrow(), vec![Some(5), Some(7), Some(3)]);

        // The rest of the stream is still there, in order.
        let next = wait_for(&mut connection, &mut dispatcher, 3, None)
            .unwrap()
            .unwrap();
        assert_eq!(next.id(), Some(3));
        assert_eq!(*seen.borrow(), vec![Some(5), Some(7), Some(3), Some(9), Some(3)]);
    }

    #[test]
    fn wait_for_matches_typed_replies() {
        let (mut daemon, mut connection) = connected();
        daemon.send(json!({"command": "fsck_reply", "id": 1, "status": "initializing"}));
        daemon.send(json!({"command": "pong", "id": 2, "ts": "100"}));

        let (mut dispatcher, seen) = recording_dispatcher();
        let found = wait_for(&mut connection, &mut dispatcher, 2, None)
            .unwrap()
            .unwrap();
        assert!(matches!(found, Message::Pong(_)));
        assert_eq!(*seen.borrow(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn wait_for_without_match_returns_none_at_end_of_stream() {
        let (mut daemon, mut connection) = connected();
        daemon.send(json!({"command": "notice", "id": 1}));
        daemon.send(json!({"command": "notice"}));
        daemon.end();

        let (mut dispatcher, seen) = recording_dispatcher();
        let found = wait_for(&mut connection, &mut dispatcher, 42, None).unwrap();
        assert!(found.is_none());
        assert_eq!(*seen.borrow(), vec![Some(1), None]);
    }

    #[test]
    fn wait_for_honours_deadline() {
        let (mut daemon, mut connection) = connected();
        daemon.send(json!({"command": "notice", "id": 1}));

        let (mut dispatcher, seen) = recording_dispatcher();
        let deadline = Deadline::after(Duration::from_millis(50));
        let err = wait_for(&mut connection, &mut dispatcher, 2, Some(&deadline)).unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));
        assert_eq!(*seen.borrow(), vec![Some(1)]);
    }

    #[test]
    fn run_forever_stops_at_end_of_stream() {
        let (mut daemon, mut connection) = connected();
        for id in 1..=4 {
            daemon.send(json!({"command": "notice", "id": id}));
        }
        daemon.end();

        let (mut dispatcher, seen) = recording_dispatcher();
        run_forever(&mut connection, &mut dispatcher, None).unwrap();
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn run_forever_stops_when_daemon_hangs_up() {
        let (mut daemon, mut connection) = connected();
        daemon.send(json!({"command": "notice", "id": 1}));
        drop(daemon);

        let (mut dispatcher, seen) = recording_dispatcher();
        run_forever(&mut connection, &mut dispatcher, None).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(1)]);
    }

    #[test]
    fn run_until_stops_on_predicate() {
        let (mut daemon, mut connection) = connected();
        for id in 1..=5 {
            daemon.send(json!({"command": "notice", "id": id}));
        }

        let (mut dispatcher, seen) = recording_dispatcher();
        let mut count = 0;
        let last = run_until(&mut connection, &mut dispatcher, None, |_| {
            count += 1;
            count == 2
        })
        .unwrap();
        assert_eq!(last.and_then(|m| m.id()), Some(2));
        assert_eq!(seen.borrow().len(), 2);
    }
}
