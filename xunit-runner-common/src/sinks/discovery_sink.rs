use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use xunit_sdk::messages::{DiscoveryComplete, TestCaseDiscovered};
use xunit_sdk::{ManualResetEvent, Message, MessageSink, TestCase};

use crate::error::{Result, SinkError};

/// Collects discovered test cases until discovery completes
#[derive(Debug, Default)]
pub struct TestDiscoverySink {
    test_cases: Mutex<Vec<Arc<TestCase>>>,
    finished: ManualResetEvent,
    disposed: AtomicBool,
}

impl TestDiscoverySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test_cases(&self) -> Vec<Arc<TestCase>> {
        self.test_cases.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Set once DiscoveryComplete arrives
    pub fn finished(&self) -> &ManualResetEvent {
        &self.finished
    }

    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(SinkError::already_disposed("TestDiscoverySink"));
        }
        self.finished.set();
        Ok(())
    }
}

impl MessageSink for TestDiscoverySink {
    fn on_message(&self, message: &Message) -> bool {
        message.dispatch::<TestCaseDiscovered>(|args| {
            self.test_cases
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(args.message.test_case.clone());
        });
        message.dispatch::<DiscoveryComplete>(|_| self.finished.set());
        true
    }
}
