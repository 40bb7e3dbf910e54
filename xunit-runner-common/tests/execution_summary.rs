//! Delegating sinks observing real assembly runs

use serde_json::json;
use std::sync::{Arc, Mutex};

use xunit_runner_common::{DelegatingExecutionSummarySink, ExecutionSink, ExecutionSummary, RunnerConfig};
use xunit_sdk::bus::NullSink;
use xunit_sdk::{
    CancellationSignal, Fault, Fixture, MessageBus, TestAssembly, TestAssemblyRunner, TestBody, TestCase, TestClass,
    TestCollection, TestMethod,
};

fn passing_case(class: &Arc<TestClass>, name: &str) -> Arc<TestCase> {
    let method = TestMethod::new(class.clone(), name).with_body(TestBody::new(|_| Ok(())));
    Arc::new(TestCase::new(Arc::new(method), Vec::new()))
}

#[test]
fn test_class_cleanup_failure_counts_one_error() {
    let assembly = Arc::new(TestAssembly::new(
        "Sample.Tests",
        Some("/bin/Sample.Tests.dll".into()),
        None,
    ));
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(TestClass::new(collection, "Leaky").with_fixture(
        Fixture::new("handle", || Ok(json!(1))).with_dispose(|_| Err(Fault::new("IOException", "already closed"))),
    ));

    let completions: Arc<Mutex<Vec<(String, ExecutionSummary)>>> = Arc::default();
    let log = completions.clone();
    let sink = DelegatingExecutionSummarySink::new(NullSink)
        .with_completion_callback(move |name, summary| log.lock().unwrap().push((name.to_string(), *summary)));

    let cases = vec![passing_case(&class, "A"), passing_case(&class, "B")];
    TestAssemblyRunner::new(assembly, cases, RunnerConfig::default().execution_options())
        .run(&sink, &CancellationSignal::new());

    assert!(sink.finished().is_set());
    let summary = sink.execution_summary().unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(sink.errors(), 1);

    let completions = completions.lock().unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, "Sample.Tests");
    assert_eq!(completions[0].1, summary);
}

#[test]
fn test_cancel_thunk_stops_run_through_bus() {
    let assembly = Arc::new(TestAssembly::new("Sample.Tests", None, None));
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let first = Arc::new(TestClass::new(collection.clone(), "First"));
    let second = Arc::new(TestClass::new(collection, "Second"));

    let cancellation = CancellationSignal::new();
    let requested = Arc::new(Mutex::new(false));
    let flag = requested.clone();

    // the host asks to stop while the first class runs
    let bus = MessageBus::new();
    let sink = Arc::new(DelegatingExecutionSummarySink::new(NullSink).with_cancel_thunk(move || *flag.lock().unwrap()));
    bus.subscribe(sink.clone());

    let marker = requested.clone();
    let stopping = TestMethod::new(first.clone(), "RequestsStop").with_body(TestBody::new(move |_| {
        *marker.lock().unwrap() = true;
        Ok(())
    }));
    let cases = vec![
        Arc::new(TestCase::new(Arc::new(stopping), Vec::new())),
        passing_case(&second, "NeverRuns"),
    ];

    TestAssemblyRunner::new(assembly, cases, Default::default()).run(&bus, &cancellation);

    assert!(cancellation.is_cancelled());
    let summary = sink.execution_summary().unwrap();
    assert_eq!(summary.total, 1);
    assert!(sink.dispose().is_ok());
    assert!(sink.dispose().is_err());
}
