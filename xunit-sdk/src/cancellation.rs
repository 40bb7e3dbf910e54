//! Cancellation signal and wait handle
//!
//! Both primitives are shared by cloning; every clone observes the same state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::debug;

/// Cooperative, idempotent stop flag shared by every runner level.
///
/// Setting it never interrupts work in flight; runners check it before
/// starting each new unit.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only for the call that set the flag.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            debug!("Cancellation requested");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct EventState {
    set: Mutex<bool>,
    changed: Condvar,
}

/// Manual-reset wait handle: once set, every waiter is released until reset.
#[derive(Debug, Clone, Default)]
pub struct ManualResetEvent {
    state: Arc<EventState>,
}

impl ManualResetEvent {
    pub fn new(initial_state: bool) -> Self {
        Self {
            state: Arc::new(EventState {
                set: Mutex::new(initial_state),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn set(&self) {
        let mut set = self.state.set.lock().unwrap_or_else(|e| e.into_inner());
        *set = true;
        self.state.changed.notify_all();
    }

    pub fn reset(&self) {
        let mut set = self.state.set.lock().unwrap_or_else(|e| e.into_inner());
        *set = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.set.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the event is set
    pub fn wait(&self) {
        let mut set = self.state.set.lock().unwrap_or_else(|e| e.into_inner());
        while !*set {
            set = self.state.changed.wait(set).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the event is set or the timeout elapses; returns whether it was set
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let set = self.state.set.lock().unwrap_or_else(|e| e.into_inner());
        let (set, _) = self
            .state
            .changed
            .wait_timeout_while(set, timeout, |set| !*set)
            .unwrap_or_else(|e| e.into_inner());
        *set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = CancellationSignal::new();
        let observer = signal.clone();

        assert!(!observer.is_cancelled());
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_cancel_from_many_threads_sets_once() {
        let signal = CancellationSignal::new();
        let winners: usize = (0..8)
            .map(|_| {
                let signal = signal.clone();
                thread::spawn(move || signal.cancel())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_event_releases_waiter() {
        let event = ManualResetEvent::new(false);
        let setter = event.clone();

        let handle = thread::spawn(move || setter.set());
        event.wait();
        handle.join().unwrap();

        assert!(event.is_set());
    }

    #[test]
    fn test_event_wait_timeout() {
        let event = ManualResetEvent::new(false);
        assert!(!event.wait_timeout(Duration::from_millis(10)));

        event.set();
        assert!(event.wait_timeout(Duration::from_millis(10)));

        event.reset();
        assert!(!event.is_set());
    }
}
