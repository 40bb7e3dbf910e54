//! Hierarchical test runners
//!
//! Each level publishes its Starting message, runs its children in order while
//! the cancellation signal is clear, folds their summaries into its own, and
//! always publishes its Finished message. A `false` from the sink at any point
//! sets the shared cancellation signal.

mod fixtures;
mod test_assembly;
mod test_case;
mod test_class;
mod test_collection;
mod test_method;

pub use fixtures::{CreatedFixture, FixtureScope};
pub use test_assembly::TestAssemblyRunner;
pub use test_case::{TestCaseRunner, TestCaseState};
pub use test_class::TestClassRunner;
pub use test_collection::TestCollectionRunner;
pub use test_method::TestMethodRunner;

use indexmap::IndexMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::aggregator::ExceptionAggregator;
use crate::bus::MessageSink;
use crate::cancellation::CancellationSignal;
use crate::fault::{FailureInformation, Fault};
use crate::messages::{ErrorMessage, Message};
use crate::model::{TestCase, TestClass, TestCollection, TestMethod};

/// Settings that shape a run
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Cancel the run after the first failed test
    pub stop_on_fail: bool,
    /// Run test collections on separate worker threads
    pub parallelize_test_collections: bool,
    /// Worker thread limit; zero uses the available parallelism
    pub max_parallel_threads: usize,
    /// Timeout for test cases that do not declare one; zero means none
    pub default_timeout_ms: u64,
}

impl ExecutionOptions {
    pub fn effective_max_threads(&self) -> usize {
        if self.max_parallel_threads > 0 {
            self.max_parallel_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Shared state threaded through every runner level
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub sink: &'a dyn MessageSink,
    pub cancellation: &'a CancellationSignal,
    pub options: &'a ExecutionOptions,
}

impl<'a> RunContext<'a> {
    pub fn new(sink: &'a dyn MessageSink, cancellation: &'a CancellationSignal, options: &'a ExecutionOptions) -> Self {
        Self {
            sink,
            cancellation,
            options,
        }
    }

    /// Publish a message; a stop request from the sink cancels the run.
    ///
    /// A panicking sink counts as a stop request and is reported as an
    /// [`ErrorMessage`].
    pub fn publish(&self, message: impl Into<Message>) -> bool {
        let message = message.into();
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.on_message(&message))) {
            Ok(true) => true,
            Ok(false) => {
                self.cancellation.cancel();
                false
            }
            Err(payload) => {
                let fault = Fault::from_panic(payload);
                warn!("Message sink panicked on {:?}: {}", message.kind(), fault);
                self.cancellation.cancel();

                let error: Message = ErrorMessage {
                    failure: FailureInformation::from_fault(&fault),
                }
                .into();
                let _ = panic::catch_unwind(AssertUnwindSafe(|| self.sink.on_message(&error)));
                false
            }
        }
    }

    /// Run the children of one level; a fault escaping them is reported as an
    /// [`ErrorMessage`] so the level can still publish its Finished message
    pub(crate) fn run_children(&self, level: &str, children: impl FnOnce()) {
        let mut guard = ExceptionAggregator::new();
        guard.run(|| {
            children();
            Ok(())
        });

        if let Some(failure) = guard.to_failure_information() {
            warn!("Running children of {} faulted: {}", level, failure.summary_message());
            self.cancellation.cancel();
            self.publish(ErrorMessage { failure });
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Description of the machine the tests run on
pub fn test_environment() -> String {
    format!("{}-bit {}", usize::BITS, std::env::consts::OS)
}

pub(crate) trait UniqueId {
    fn unique_id(&self) -> &str;
}

impl UniqueId for TestCollection {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

impl UniqueId for TestClass {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

impl UniqueId for TestMethod {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

/// Group cases by parent identity, in order of first appearance
pub(crate) fn group_cases<P: UniqueId>(
    cases: &[Arc<TestCase>],
    parent: impl Fn(&TestCase) -> &Arc<P>,
) -> Vec<(Arc<P>, Vec<Arc<TestCase>>)> {
    let mut groups: IndexMap<String, (Arc<P>, Vec<Arc<TestCase>>)> = IndexMap::new();

    for case in cases {
        let owner = parent(case);
        groups
            .entry(owner.unique_id().to_string())
            .or_insert_with(|| (owner.clone(), Vec::new()))
            .1
            .push(case.clone());
    }

    groups.into_values().collect()
}
