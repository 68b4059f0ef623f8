use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in microseconds since the Unix epoch.
///
/// Ping timestamps and pong lag must come from the same clock, so the client
/// and its built-in handlers share one instance.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_micros()).unwrap_or(i64::MAX),
            Err(err) => -i64::try_from(err.duration().as_micros()).unwrap_or(i64::MAX),
        }
    }
}

/// A clock that only moves when told to. Useful for replaying traffic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_micros: i64) -> Self {
        Self {
            now: AtomicI64::new(now_micros),
        }
    }

    pub fn set(&self, now_micros: i64) {
        self.now.store(now_micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
