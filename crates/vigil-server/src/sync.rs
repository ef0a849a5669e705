//! Manual-Reset Event
//!
//! A small synchronization primitive used throughout the runtime: once
//! signaled, an event stays signaled - releasing every waiter, present and
//! future - until it is explicitly reset.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Event that stays signaled until explicitly reset
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl ManualResetEvent {
    /// Create a new event in the non-signaled state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event, releasing all current and future waiters
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Return the event to the non-signaled state
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Whether the event is currently signaled
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the event is signaled
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.condvar.wait(&mut signaled);
        }
    }

    /// Block until the event is signaled or the timeout elapses
    ///
    /// Returns `true` if the event was signaled, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.condvar.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_unsignaled() {
        let event = ManualResetEvent::new();
        assert!(!event.is_signaled());
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_stays_signaled_until_reset() {
        let event = ManualResetEvent::new();
        event.signal();
        assert!(event.is_signaled());

        // Multiple waits succeed without re-signaling
        assert!(event.wait_timeout(Duration::from_millis(1)));
        assert!(event.wait_timeout(Duration::from_millis(1)));

        event.reset();
        assert!(!event.is_signaled());
    }

    #[test]
    fn test_releases_blocked_waiter() {
        let event = Arc::new(ManualResetEvent::new());
        let waiter = {
            let event = Arc::clone(&event);
            std::thread::spawn(move || event.wait_timeout(Duration::from_secs(5)))
        };

        std::thread::sleep(Duration::from_millis(20));
        event.signal();
        assert!(waiter.join().unwrap());
    }
}
