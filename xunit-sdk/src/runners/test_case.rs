//! Test case runner
//!
//! Runs a single test case: Starting, then exactly one of Passed, Failed or
//! Skipped, then the per-test cleanup hook, then Finished.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::RunContext;
use crate::aggregator::ExceptionAggregator;
use crate::fault::Fault;
use crate::messages::{
    TestCaseFinished, TestCaseStarting, TestCleanupFailure, TestFailed, TestOutcome, TestPassed, TestSkipped,
};
use crate::model::{ArgValue, TestBody, TestCase, TestInvocation, TestOutput};
use crate::summary::RunSummary;
use crate::unique_id;

/// Lifecycle of one test case run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseState {
    NotStarted,
    Starting,
    Invoking,
    Passed,
    Failed,
    Skipped,
    Finished,
}

pub struct TestCaseRunner<'a> {
    test_case: &'a TestCase,
    constructor_arguments: &'a [ArgValue],
    state: TestCaseState,
}

impl<'a> TestCaseRunner<'a> {
    pub fn new(test_case: &'a TestCase, constructor_arguments: &'a [ArgValue]) -> Self {
        Self {
            test_case,
            constructor_arguments,
            state: TestCaseState::NotStarted,
        }
    }

    pub fn state(&self) -> TestCaseState {
        self.state
    }

    fn transition(&mut self, next: TestCaseState) {
        debug!("{}: {:?} -> {:?}", self.test_case.display_name, self.state, next);
        self.state = next;
    }

    /// Run the case. Faults already present in `parent` fail it without invocation.
    pub fn run(&mut self, ctx: &RunContext<'_>, parent: &ExceptionAggregator) -> RunSummary {
        let test_case = self.test_case;
        let method_id = test_case.method.unique_id.clone();
        let case_id = test_case.unique_id.clone();

        self.transition(TestCaseState::Starting);
        let started = ctx.publish(TestCaseStarting {
            test_method_unique_id: method_id.clone(),
            test_case_unique_id: case_id.clone(),
            display_name: test_case.display_name.clone(),
            skip_reason: test_case.skip_reason.clone(),
            traits: test_case.traits.clone(),
            source_information: test_case.source_information.clone(),
        });

        let mut summary = RunSummary::default();
        let outcome = if started {
            self.execute(ctx, parent, &mut summary)
        } else {
            TestOutcome::NotRun
        };

        self.transition(TestCaseState::Finished);
        ctx.publish(TestCaseFinished {
            test_method_unique_id: method_id,
            test_case_unique_id: case_id,
            outcome,
            summary,
        });

        summary
    }

    fn execute(&mut self, ctx: &RunContext<'_>, parent: &ExceptionAggregator, summary: &mut RunSummary) -> TestOutcome {
        let test_case = self.test_case;

        if let Some(reason) = &test_case.skip_reason {
            self.transition(TestCaseState::Skipped);
            ctx.publish(TestSkipped {
                test_case_unique_id: test_case.unique_id.clone(),
                reason: reason.clone(),
            });
            summary.record_outcome(1, 0, 1, Duration::ZERO);
            return TestOutcome::Skipped;
        }

        let mut aggregator = ExceptionAggregator::from_parent(parent);
        let output = TestOutput::default();
        let mut elapsed = Duration::ZERO;

        if !aggregator.has_exceptions() {
            self.transition(TestCaseState::Invoking);
            let start = Instant::now();
            let invocation = TestInvocation {
                constructor_arguments: self.constructor_arguments.to_vec(),
                method_arguments: test_case.arguments.clone(),
                cancellation: ctx.cancellation.clone(),
                output: output.clone(),
            };

            match &test_case.method.body {
                Some(body) => {
                    let timeout_ms = match test_case.timeout_ms {
                        0 => ctx.options.default_timeout_ms,
                        declared => declared,
                    };
                    if let Err(fault) = invoke(body, invocation, timeout_ms, &test_case.unique_id) {
                        aggregator.add(fault);
                    }
                }
                None => aggregator.add(Fault::new(
                    "TestMethodNotInvocable",
                    format!("Test method '{}' has no body", test_case.method.name),
                )),
            }
            elapsed = start.elapsed();

            if let Some(hook) = &test_case.class().test_cleanup {
                let mut cleanup = ExceptionAggregator::new();
                cleanup.run(|| hook.run());
                if let Some(failure) = cleanup.to_failure_information() {
                    ctx.publish(TestCleanupFailure {
                        test_case_unique_id: test_case.unique_id.clone(),
                        failure,
                    });
                }
            }
        }

        match aggregator.to_failure_information() {
            Some(failure) => {
                self.transition(TestCaseState::Failed);
                debug!("{} failed: {}", test_case.display_name, failure.summary_message());
                ctx.publish(TestFailed {
                    test_case_unique_id: test_case.unique_id.clone(),
                    execution_time: elapsed,
                    output: output.contents(),
                    failure,
                });
                summary.record_outcome(1, 1, 0, elapsed);

                if ctx.options.stop_on_fail && ctx.cancellation.cancel() {
                    warn!("Stopping run after failure in {}", test_case.display_name);
                }
                TestOutcome::Failed
            }
            None => {
                self.transition(TestCaseState::Passed);
                ctx.publish(TestPassed {
                    test_case_unique_id: test_case.unique_id.clone(),
                    execution_time: elapsed,
                    output: output.contents(),
                });
                summary.record_outcome(1, 0, 0, elapsed);
                TestOutcome::Passed
            }
        }
    }
}

fn invoke_inline(body: &TestBody, invocation: &TestInvocation) -> Result<(), Fault> {
    panic::catch_unwind(AssertUnwindSafe(|| body.invoke(invocation))).unwrap_or_else(|payload| Err(Fault::from_panic(payload)))
}

/// Invoke a body, bounded by `timeout_ms` when it is non-zero.
///
/// A timed-out body keeps running on its detached thread; its eventual result is dropped.
fn invoke(body: &TestBody, invocation: TestInvocation, timeout_ms: u64, case_id: &str) -> Result<(), Fault> {
    if timeout_ms == 0 {
        return invoke_inline(body, &invocation);
    }

    let (tx, rx) = mpsc::channel();
    let body = body.clone();
    let spawned = thread::Builder::new()
        .name(format!("test-{}", unique_id::short(case_id)))
        .spawn(move || {
            let _ = tx.send(invoke_inline(&body, &invocation));
        });

    if let Err(error) = spawned {
        return Err(Fault::from_error(&error));
    }

    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("Test {} exceeded {}ms", case_id, timeout_ms);
            Err(Fault::timeout(timeout_ms))
        }
        Err(RecvTimeoutError::Disconnected) => Err(Fault::new(
            "TestInvocationFailed",
            "Test thread exited without reporting a result",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FnSink;
    use crate::cancellation::CancellationSignal;
    use crate::messages::{Message, MessageKind};
    use crate::model::{TestAssembly, TestClass, TestCollection, TestMethod};
    use crate::runners::ExecutionOptions;
    use std::sync::{Arc, Mutex};

    fn case_with(body: TestBody) -> TestCase {
        let assembly = Arc::new(TestAssembly::new("Tests", None, None));
        let collection = Arc::new(TestCollection::new(assembly, "Default"));
        let class = Arc::new(TestClass::new(collection, "Sample"));
        TestCase::new(Arc::new(TestMethod::new(class, "Works").with_body(body)), Vec::new())
    }

    fn run(test_case: &TestCase, options: &ExecutionOptions) -> (RunSummary, Vec<Message>, TestCaseState) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let log = messages.clone();
        let sink = FnSink(move |message: &Message| {
            log.lock().unwrap().push(message.clone());
            true
        });
        let cancellation = CancellationSignal::new();
        let ctx = RunContext::new(&sink, &cancellation, options);

        let mut runner = TestCaseRunner::new(test_case, &[]);
        let summary = runner.run(&ctx, &ExceptionAggregator::new());
        let messages = messages.lock().unwrap().clone();
        (summary, messages, runner.state())
    }

    fn kinds(messages: &[Message]) -> Vec<MessageKind> {
        messages.iter().map(Message::kind).collect()
    }

    #[test]
    fn test_passing_case_reports_output() {
        let test_case = case_with(TestBody::new(|invocation| {
            invocation.output.write_line("hello");
            Ok(())
        }));

        let (summary, messages, state) = run(&test_case, &ExecutionOptions::default());

        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(state, TestCaseState::Finished);
        assert_eq!(
            kinds(&messages),
            vec![MessageKind::TestCaseStarting, MessageKind::TestPassed, MessageKind::TestCaseFinished]
        );
        let passed = messages[1].downcast::<TestPassed>().unwrap();
        assert_eq!(passed.output, "hello\n");
    }

    #[test]
    fn test_panicking_body_fails() {
        let test_case = case_with(TestBody::new(|_| panic!("boom")));
        let (summary, messages, _) = run(&test_case, &ExecutionOptions::default());

        assert_eq!(summary.failed, 1);
        let failed = messages[1].downcast::<TestFailed>().unwrap();
        assert_eq!(failed.failure.messages, vec!["boom"]);
    }

    #[test]
    fn test_timeout_fails_case() {
        let test_case = case_with(TestBody::new(|_| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        }))
        .with_timeout_ms(20);

        let (summary, messages, _) = run(&test_case, &ExecutionOptions::default());

        assert_eq!(summary.failed, 1);
        let failed = messages[1].downcast::<TestFailed>().unwrap();
        assert_eq!(failed.failure.exception_types, vec!["TestTimeoutException"]);
    }

    #[test]
    fn test_parent_faults_fail_without_invoking() {
        let invoked = Arc::new(Mutex::new(false));
        let flag = invoked.clone();
        let test_case = case_with(TestBody::new(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        }));

        let mut parent = ExceptionAggregator::new();
        parent.add(Fault::new("ClassSetupFailed", "fixture"));

        let options = ExecutionOptions::default();
        let cancellation = CancellationSignal::new();
        let sink = crate::bus::NullSink;
        let ctx = RunContext::new(&sink, &cancellation, &options);
        let summary = TestCaseRunner::new(&test_case, &[]).run(&ctx, &parent);

        assert_eq!(summary.failed, 1);
        assert!(!*invoked.lock().unwrap());
    }

    #[test]
    fn test_stop_on_fail_cancels() {
        let test_case = case_with(TestBody::new(|_| Err(Fault::new("AssertFailed", "nope"))));
        let options = ExecutionOptions {
            stop_on_fail: true,
            ..ExecutionOptions::default()
        };
        let cancellation = CancellationSignal::new();
        let sink = crate::bus::NullSink;
        let ctx = RunContext::new(&sink, &cancellation, &options);

        TestCaseRunner::new(&test_case, &[]).run(&ctx, &ExceptionAggregator::new());
        assert!(cancellation.is_cancelled());
    }

    #[test]
    fn test_starting_rejected_still_finishes() {
        let test_case = case_with(TestBody::new(|_| Ok(())));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let log = messages.clone();
        let sink = FnSink(move |message: &Message| {
            log.lock().unwrap().push(message.kind());
            !message.is::<TestCaseStarting>()
        });
        let options = ExecutionOptions::default();
        let cancellation = CancellationSignal::new();
        let ctx = RunContext::new(&sink, &cancellation, &options);

        let summary = TestCaseRunner::new(&test_case, &[]).run(&ctx, &ExceptionAggregator::new());

        assert_eq!(summary, RunSummary::default());
        assert!(cancellation.is_cancelled());
        assert_eq!(
            *messages.lock().unwrap(),
            vec![MessageKind::TestCaseStarting, MessageKind::TestCaseFinished]
        );
    }
}
