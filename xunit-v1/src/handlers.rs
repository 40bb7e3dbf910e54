//! Callback handlers that translate legacy result nodes into messages

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use xunit_sdk::messages::{
    ErrorMessage, TestCaseFinished, TestCaseStarting, TestFailed, TestMethodFinished, TestMethodStarting, TestOutcome,
    TestPassed, TestSkipped,
};
use xunit_sdk::{ManualResetEvent, Message, MessageSink, RunSummary, TestCase};

use crate::conversion::{failure_from_node, parse_duration};
use crate::executor::LegacyCallbackHandler;
use crate::node::LegacyNode;

/// Counters for a legacy run plus whether the consumer wants more
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyRunSummary {
    pub summary: RunSummary,
    pub continue_running: bool,
}

impl Default for LegacyRunSummary {
    fn default() -> Self {
        Self {
            summary: RunSummary::default(),
            continue_running: true,
        }
    }
}

impl LegacyRunSummary {
    pub fn aggregate(&mut self, other: LegacyRunSummary) {
        self.summary += other.summary;
        self.continue_running &= other.continue_running;
    }
}

/// Keeps the last node it receives; used for enumeration documents
#[derive(Debug, Default)]
pub struct NodeCaptureHandler {
    node: Mutex<Option<LegacyNode>>,
}

impl NodeCaptureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<LegacyNode> {
        self.node.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl LegacyCallbackHandler for NodeCaptureHandler {
    fn on_node(&self, node: &LegacyNode) -> bool {
        *self.node.lock().unwrap_or_else(|e| e.into_inner()) = Some(node.clone());
        true
    }
}

/// The case whose Starting messages went out but whose Finished did not
struct OpenCase {
    test_case: Arc<TestCase>,
    summary: RunSummary,
    outcome: TestOutcome,
}

impl OpenCase {
    fn new(test_case: Arc<TestCase>) -> Self {
        Self {
            test_case,
            summary: RunSummary::default(),
            outcome: TestOutcome::NotRun,
        }
    }

    /// Fold in one reported row; any failure fails the case
    fn record(&mut self, row: RunSummary, outcome: TestOutcome) {
        self.summary += row;
        self.outcome = match (self.outcome, outcome) {
            (TestOutcome::Failed, _) | (_, TestOutcome::Failed) => TestOutcome::Failed,
            (TestOutcome::Passed, _) | (_, TestOutcome::Passed) => TestOutcome::Passed,
            (_, other) => other,
        };
    }
}

#[derive(Default)]
struct ClassRunState {
    results: LegacyRunSummary,
    current: Option<OpenCase>,
}

/// Handles the nodes reported while a legacy engine runs one class.
///
/// Case and method Finished messages go out when the engine moves on to
/// another case or reports the `class` node, so theory rows sharing one
/// method are reported under a single case.
pub struct TestClassCallbackHandler {
    /// Test cases by method name; the engine reports nothing more specific
    test_cases: HashMap<String, Arc<TestCase>>,
    sink: Arc<dyn MessageSink>,
    state: Mutex<ClassRunState>,
    last_node_arrived: ManualResetEvent,
}

impl TestClassCallbackHandler {
    pub fn new(test_cases: &[Arc<TestCase>], sink: Arc<dyn MessageSink>) -> Self {
        Self {
            test_cases: test_cases
                .iter()
                .map(|case| (case.method.name.clone(), case.clone()))
                .collect(),
            sink,
            state: Mutex::new(ClassRunState::default()),
            last_node_arrived: ManualResetEvent::new(false),
        }
    }

    /// Set when the engine reports the `class` node
    pub fn last_node_arrived(&self) -> &ManualResetEvent {
        &self.last_node_arrived
    }

    pub fn results(&self) -> LegacyRunSummary {
        self.lock().results
    }

    /// Close the case still in progress, if any.
    ///
    /// Called for the `class` node, and by the front controller when the
    /// engine gave up without sending one.
    pub fn finish(&self) {
        let mut state = self.lock();
        self.switch_to(&mut state, None);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClassRunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &mut ClassRunState, message: impl Into<Message>) {
        let keep_going = self.sink.on_message(&message.into());
        state.results.continue_running &= keep_going;
    }

    fn test_case_for(&self, node: &LegacyNode) -> Option<Arc<TestCase>> {
        let method_name = node.attr("method")?;
        let found = self.test_cases.get(method_name).cloned();
        if found.is_none() {
            warn!("Legacy engine reported unknown test method '{}'", method_name);
        }
        found
    }

    /// Make `next` the open case, finishing the previous one when it differs
    fn switch_to(&self, state: &mut ClassRunState, next: Option<&Arc<TestCase>>) {
        let unchanged = match (&state.current, next) {
            (Some(open), Some(next)) => open.test_case.unique_id == next.unique_id,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(open) = state.current.take() {
            self.finish_case(state, open);
        }
        if let Some(test_case) = next {
            self.start_case(state, test_case);
            state.current = Some(OpenCase::new(test_case.clone()));
        }
    }

    fn start_case(&self, state: &mut ClassRunState, test_case: &TestCase) {
        self.publish(
            state,
            TestMethodStarting {
                test_class_unique_id: test_case.class().unique_id.clone(),
                test_method_unique_id: test_case.method.unique_id.clone(),
                test_method: test_case.method.name.clone(),
            },
        );
        self.publish(
            state,
            TestCaseStarting {
                test_method_unique_id: test_case.method.unique_id.clone(),
                test_case_unique_id: test_case.unique_id.clone(),
                display_name: test_case.display_name.clone(),
                skip_reason: test_case.skip_reason.clone(),
                traits: test_case.traits.clone(),
                source_information: test_case.source_information.clone(),
            },
        );
    }

    fn finish_case(&self, state: &mut ClassRunState, open: OpenCase) {
        let test_case = open.test_case;
        if open.outcome == TestOutcome::NotRun {
            debug!("Legacy case {} ended without a result", test_case.display_name);
        }

        self.publish(
            state,
            TestCaseFinished {
                test_method_unique_id: test_case.method.unique_id.clone(),
                test_case_unique_id: test_case.unique_id.clone(),
                outcome: open.outcome,
                summary: open.summary,
            },
        );
        self.publish(
            state,
            TestMethodFinished {
                test_class_unique_id: test_case.class().unique_id.clone(),
                test_method_unique_id: test_case.method.unique_id.clone(),
                summary: open.summary,
            },
        );
    }

    fn on_start(&self, node: &LegacyNode) {
        if let Some(test_case) = self.test_case_for(node) {
            let mut state = self.lock();
            self.switch_to(&mut state, Some(&test_case));
        }
    }

    fn on_test(&self, node: &LegacyNode) {
        let Some(test_case) = self.test_case_for(node) else {
            return;
        };
        let mut state = self.lock();
        // skipped tests are reported without a preceding start node
        self.switch_to(&mut state, Some(&test_case));

        let case_id = test_case.unique_id.clone();
        let execution_time = parse_duration(node.attr("time"));
        let output = node.child_text("output").unwrap_or_default().to_string();
        let mut row = RunSummary::default();

        let outcome = match node.attr("result") {
            Some("Pass") => {
                row.record_outcome(1, 0, 0, execution_time);
                self.publish(
                    &mut state,
                    TestPassed {
                        test_case_unique_id: case_id,
                        execution_time,
                        output,
                    },
                );
                TestOutcome::Passed
            }
            Some("Skip") => {
                row.record_outcome(1, 0, 1, execution_time);
                let reason = node
                    .child("reason")
                    .and_then(|reason| reason.child_text("message").or(reason.text.as_deref()))
                    .unwrap_or_default()
                    .to_string();
                self.publish(
                    &mut state,
                    TestSkipped {
                        test_case_unique_id: case_id,
                        reason,
                    },
                );
                TestOutcome::Skipped
            }
            other => {
                if other != Some("Fail") {
                    debug!("Treating legacy result {:?} as a failure", other);
                }
                row.record_outcome(1, 1, 0, execution_time);
                let failure = node.child("failure").map(failure_from_node).unwrap_or_default();
                self.publish(
                    &mut state,
                    TestFailed {
                        test_case_unique_id: case_id,
                        execution_time,
                        output,
                        failure,
                    },
                );
                TestOutcome::Failed
            }
        };

        if let Some(open) = state.current.as_mut() {
            open.record(row, outcome);
        }
        state.results.summary += row;
    }

    fn on_class(&self, node: &LegacyNode) {
        let mut state = self.lock();
        self.switch_to(&mut state, None);
        if let Some(failure) = node.child("failure") {
            self.publish(
                &mut state,
                ErrorMessage {
                    failure: failure_from_node(failure),
                },
            );
        }
        drop(state);

        debug!("Legacy class {:?} complete", node.attr("name"));
        self.last_node_arrived.set();
    }
}

impl LegacyCallbackHandler for TestClassCallbackHandler {
    fn on_node(&self, node: &LegacyNode) -> bool {
        match node.name.as_str() {
            "start" => self.on_start(node),
            "test" => self.on_test(node),
            "class" => self.on_class(node),
            other => debug!("Ignoring legacy node '{}'", other),
        }
        self.lock().results.continue_running
    }
}
