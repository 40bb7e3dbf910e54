//! End-to-end runs through the assembly runner

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use xunit_sdk::bus::FnSink;
use xunit_sdk::messages::*;
use xunit_sdk::model::Hook;
use xunit_sdk::{
    CancellationSignal, ExecutionOptions, Fault, Fixture, Message, MessageBus, MessageKind, TestAssembly,
    TestAssemblyRunner, TestBody, TestCase, TestClass, TestCollection, TestMethod,
};

type Log = Arc<Mutex<Vec<Message>>>;

fn recorder(log: Log, stop_when: impl Fn(&Message, usize) -> bool + Send + Sync + 'static) -> FnSink<impl Fn(&Message) -> bool + Send + Sync> {
    FnSink(move |message: &Message| {
        let mut log = log.lock().unwrap();
        log.push(message.clone());
        !stop_when(message, log.len())
    })
}

fn passing() -> TestBody {
    TestBody::new(|_| Ok(()))
}

fn failing() -> TestBody {
    TestBody::new(|_| Err(Fault::new("AssertException", "expected 1, got 2")))
}

fn case(class: &Arc<TestClass>, name: &str, body: TestBody) -> Arc<TestCase> {
    Arc::new(TestCase::new(
        Arc::new(TestMethod::new(class.clone(), name).with_body(body)),
        Vec::new(),
    ))
}

fn assembly() -> Arc<TestAssembly> {
    Arc::new(TestAssembly::new("Sample.Tests", Some("/bin/Sample.Tests.dll".into()), None))
}

fn run(assembly: Arc<TestAssembly>, cases: Vec<Arc<TestCase>>, options: ExecutionOptions) -> (Vec<Message>, CancellationSignal) {
    let log: Log = Arc::default();
    let sink = recorder(log.clone(), |_, _| false);
    let cancellation = CancellationSignal::new();
    TestAssemblyRunner::new(assembly, cases, options).run(&sink, &cancellation);
    let messages = log.lock().unwrap().clone();
    (messages, cancellation)
}

fn count(messages: &[Message], kind: MessageKind) -> usize {
    messages.iter().filter(|m| m.kind() == kind).count()
}

/// Unique ID of the hierarchy element a Starting/Finished message is about
fn level_key(message: &Message) -> Option<(&'static str, bool, String)> {
    match message {
        Message::TestAssemblyStarting(m) => Some(("assembly", true, m.assembly_unique_id.clone())),
        Message::TestAssemblyFinished(m) => Some(("assembly", false, m.assembly_unique_id.clone())),
        Message::TestCollectionStarting(m) => Some(("collection", true, m.test_collection_unique_id.clone())),
        Message::TestCollectionFinished(m) => Some(("collection", false, m.test_collection_unique_id.clone())),
        Message::TestClassStarting(m) => Some(("class", true, m.test_class_unique_id.clone())),
        Message::TestClassFinished(m) => Some(("class", false, m.test_class_unique_id.clone())),
        Message::TestMethodStarting(m) => Some(("method", true, m.test_method_unique_id.clone())),
        Message::TestMethodFinished(m) => Some(("method", false, m.test_method_unique_id.clone())),
        Message::TestCaseStarting(m) => Some(("case", true, m.test_case_unique_id.clone())),
        Message::TestCaseFinished(m) => Some(("case", false, m.test_case_unique_id.clone())),
        _ => None,
    }
}

fn assert_starting_finished_matched(messages: &[Message]) {
    let mut open: HashMap<(&'static str, String), usize> = HashMap::new();
    for message in messages {
        if let Some((level, starting, id)) = level_key(message) {
            let entry = open.entry((level, id)).or_default();
            if starting {
                *entry += 1;
            } else {
                assert_eq!(*entry, 1, "Finished without matching Starting for {:?}", message.kind());
                *entry -= 1;
            }
        }
    }
    assert!(open.values().all(|&n| n == 0), "unfinished levels: {:?}", open);
}

fn assembly_summary(messages: &[Message]) -> xunit_sdk::RunSummary {
    messages
        .iter()
        .find_map(|m| m.downcast::<TestAssemblyFinished>())
        .map(|finished| finished.summary)
        .expect("assembly finished")
}

#[test]
fn test_one_failing_case_among_three_classes() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let classes: Vec<_> = ["Alpha", "Beta", "Gamma"]
        .iter()
        .map(|name| Arc::new(TestClass::new(collection.clone(), *name)))
        .collect();

    let cases = vec![
        case(&classes[0], "One", passing()),
        case(&classes[0], "Two", passing()),
        case(&classes[1], "Breaks", failing()),
        case(&classes[2], "Three", passing()),
    ];
    let failing_id = cases[2].unique_id.clone();

    let (messages, cancellation) = run(assembly, cases, ExecutionOptions::default());

    let summary = assembly_summary(&messages);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(count(&messages, MessageKind::TestClassFinished), 3);
    assert!(!cancellation.is_cancelled());

    let failed_finishes: Vec<_> = messages
        .iter()
        .filter_map(|m| m.downcast::<TestCaseFinished>())
        .filter(|f| f.outcome == TestOutcome::Failed)
        .collect();
    assert_eq!(failed_finishes.len(), 1);
    assert_eq!(failed_finishes[0].test_case_unique_id, failing_id);

    assert_starting_finished_matched(&messages);
}

#[test]
fn test_skipped_case_is_not_invoked() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(TestClass::new(collection, "Skippy"));
    let skipped = Arc::new(
        TestCase::new(
            Arc::new(TestMethod::new(class.clone(), "Later").with_body(TestBody::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))),
            Vec::new(),
        )
        .with_skip_reason("not today"),
    );

    let (messages, _) = run(assembly, vec![skipped, case(&class, "Now", passing())], ExecutionOptions::default());

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    let summary = assembly_summary(&messages);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let skip = messages.iter().find_map(|m| m.downcast::<TestSkipped>()).unwrap();
    assert_eq!(skip.reason, "not today");
}

#[test]
fn test_cancellation_between_classes_keeps_partial_summary() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let first = Arc::new(TestClass::new(collection.clone(), "First"));
    let second = Arc::new(TestClass::new(collection.clone(), "Second"));
    let cases = vec![
        case(&first, "A", passing()),
        case(&first, "B", failing()),
        case(&second, "C", passing()),
    ];

    let log: Log = Arc::default();
    let sink = recorder(log.clone(), |message, _| message.is::<TestClassFinished>());
    let cancellation = CancellationSignal::new();
    let summary = TestAssemblyRunner::new(assembly, cases, ExecutionOptions::default()).run(&sink, &cancellation);
    let messages = log.lock().unwrap().clone();

    assert!(cancellation.is_cancelled());
    assert_eq!(count(&messages, MessageKind::TestClassStarting), 1);

    let collection_finished = messages
        .iter()
        .find_map(|m| m.downcast::<TestCollectionFinished>())
        .expect("collection finished is still published");
    assert_eq!(collection_finished.summary.total, 2);
    assert_eq!(collection_finished.summary.failed, 1);
    assert_eq!(summary, collection_finished.summary);

    assert_starting_finished_matched(&messages);
}

#[test]
fn test_no_new_starting_after_cancellation() {
    let assembly = assembly();
    let mut cases = Vec::new();
    for collection_name in ["C1", "C2"] {
        let collection = Arc::new(TestCollection::new(assembly.clone(), collection_name));
        for class_name in ["K1", "K2"] {
            let class = Arc::new(TestClass::new(collection.clone(), class_name));
            cases.push(case(&class, "M1", passing()));
            cases.push(case(&class, "M2", passing()));
        }
    }

    // stop as soon as the third test case starts
    let log: Log = Arc::default();
    let starts = Arc::new(AtomicUsize::new(0));
    let seen = starts.clone();
    let sink = recorder(log.clone(), move |message, _| {
        message.is::<TestCaseStarting>() && seen.fetch_add(1, Ordering::SeqCst) == 2
    });
    let cancellation = CancellationSignal::new();
    TestAssemblyRunner::new(assembly, cases, ExecutionOptions::default()).run(&sink, &cancellation);
    let messages = log.lock().unwrap().clone();

    let stop_index = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is::<TestCaseStarting>())
        .nth(2)
        .map(|(index, _)| index)
        .unwrap();

    let late_starts = messages[stop_index + 1..]
        .iter()
        .filter(|m| matches!(level_key(m), Some((_, true, _))))
        .count();
    assert_eq!(late_starts, 0);

    // the stopped case still finishes, unexecuted
    let finished = messages[stop_index + 1..]
        .iter()
        .find_map(|m| m.downcast::<TestCaseFinished>())
        .unwrap();
    assert_eq!(finished.outcome, TestOutcome::NotRun);

    assert_starting_finished_matched(&messages);
}

#[test]
fn test_coordination_fault_reports_error_then_finished() {
    let assembly = assembly();
    let elsewhere = Arc::new(TestAssembly::new("Other.Tests", None, None));
    let collection = Arc::new(TestCollection::new(elsewhere, "Default"));
    let class = Arc::new(TestClass::new(collection, "Stray"));

    let (messages, _) = run(assembly, vec![case(&class, "Lost", passing())], ExecutionOptions::default());

    let kinds: Vec<MessageKind> = messages.iter().map(Message::kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageKind::TestAssemblyStarting,
            MessageKind::ErrorMessage,
            MessageKind::TestAssemblyFinished
        ]
    );
    let error = messages[1].downcast::<ErrorMessage>().unwrap();
    assert_eq!(error.failure.exception_parent_indices, vec![-1]);
    assert_eq!(assembly_summary(&messages).total, 0);
}

#[test]
fn test_class_cleanup_failure_does_not_fail_tests() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(TestClass::new(collection, "Leaky").with_fixture(
        Fixture::new("connection", || Ok(json!("open")))
            .with_dispose(|_| Err(Fault::new("IOException", "socket already closed"))),
    ));

    let (messages, _) = run(
        assembly,
        vec![case(&class, "A", passing()), case(&class, "B", passing())],
        ExecutionOptions::default(),
    );

    let class_finished = messages.iter().find_map(|m| m.downcast::<TestClassFinished>()).unwrap();
    assert_eq!(class_finished.summary.failed, 0);
    assert_eq!(class_finished.summary.total, 2);
    assert_eq!(count(&messages, MessageKind::TestClassCleanupFailure), 1);

    // cleanup is reported before the level's Finished
    let cleanup_index = messages.iter().position(|m| m.is::<TestClassCleanupFailure>()).unwrap();
    let finished_index = messages.iter().position(|m| m.is::<TestClassFinished>()).unwrap();
    assert!(cleanup_index < finished_index);
}

#[test]
fn test_failed_class_setup_fails_every_case() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(
        TestClass::new(collection, "NeedsDb")
            .with_fixture(Fixture::new("db", || Err(Fault::new("ConnectionRefused", "db is down")))),
    );
    let body = TestBody::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let (messages, _) = run(
        assembly,
        vec![case(&class, "Reads", body.clone()), case(&class, "Writes", body)],
        ExecutionOptions::default(),
    );

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(assembly_summary(&messages).failed, 2);
    for failed in messages.iter().filter_map(|m| m.downcast::<TestFailed>()) {
        assert_eq!(failed.failure.exception_types, vec!["ConnectionRefused"]);
    }
}

#[test]
fn test_constructor_parameters_resolve_from_nearest_fixture() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    let assembly = Arc::new(
        TestAssembly::new("Sample.Tests", None, None)
            .with_fixture(Fixture::new("config", || Ok(json!("assembly-config"))))
            .with_fixture(Fixture::new("clock", || Ok(json!("assembly-clock")))),
    );
    let collection = Arc::new(
        TestCollection::new(assembly.clone(), "Default").with_fixture(Fixture::new("clock", || Ok(json!("frozen")))),
    );
    let class = Arc::new(
        TestClass::new(collection, "UsesFixtures")
            .with_constructor_parameter("clock")
            .with_constructor_parameter("config"),
    );
    let body = TestBody::new(move |invocation| {
        record.lock().unwrap().extend(invocation.constructor_arguments.clone());
        Ok(())
    });

    let (messages, _) = run(assembly, vec![case(&class, "Reads", body)], ExecutionOptions::default());

    assert_eq!(assembly_summary(&messages).failed, 0);
    assert_eq!(*seen.lock().unwrap(), vec![json!("frozen"), json!("assembly-config")]);
}

#[test]
fn test_unresolved_constructor_parameters_fail_cases() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(
        TestClass::new(collection, "Orphan")
            .with_constructor_parameter("a")
            .with_constructor_parameter("b"),
    );

    let (messages, _) = run(assembly, vec![case(&class, "Runs", passing())], ExecutionOptions::default());

    let failed = messages.iter().find_map(|m| m.downcast::<TestFailed>()).unwrap();
    assert_eq!(
        failed.failure.messages,
        vec!["The following constructor parameters did not have matching fixture data: a, b"]
    );
}

#[test]
fn test_cleanup_hook_failure_is_reported_per_test() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(
        TestClass::new(collection, "Hooked").with_test_cleanup(Hook::new(|| Err(Fault::new("TeardownFailed", "oops")))),
    );

    let (messages, _) = run(
        assembly,
        vec![case(&class, "A", passing()), case(&class, "B", passing())],
        ExecutionOptions::default(),
    );

    assert_eq!(count(&messages, MessageKind::TestCleanupFailure), 2);
    assert_eq!(assembly_summary(&messages).failed, 0);
}

#[test]
fn test_default_timeout_applies() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(TestClass::new(collection, "Slow"));
    let slow = TestBody::new(|_| {
        thread::sleep(Duration::from_millis(500));
        Ok(())
    });

    let options = ExecutionOptions {
        default_timeout_ms: 25,
        ..ExecutionOptions::default()
    };
    let (messages, _) = run(assembly, vec![case(&class, "Sleeps", slow)], options);

    let failed = messages.iter().find_map(|m| m.downcast::<TestFailed>()).unwrap();
    assert_eq!(failed.failure.messages, vec!["Test execution timed out after 25 milliseconds"]);
}

#[test]
fn test_stop_on_fail_skips_remaining_classes() {
    let assembly = assembly();
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let first = Arc::new(TestClass::new(collection.clone(), "First"));
    let second = Arc::new(TestClass::new(collection, "Second"));

    let options = ExecutionOptions {
        stop_on_fail: true,
        ..ExecutionOptions::default()
    };
    let (messages, cancellation) = run(
        assembly,
        vec![case(&first, "Fails", failing()), case(&second, "Never", passing())],
        options,
    );

    assert!(cancellation.is_cancelled());
    assert_eq!(count(&messages, MessageKind::TestClassStarting), 1);
    assert_eq!(assembly_summary(&messages).total, 1);
    assert_starting_finished_matched(&messages);
}

#[test]
fn test_parallel_collections_aggregate_all() {
    let assembly = assembly();
    let mut cases = Vec::new();
    for index in 0..4 {
        let collection = Arc::new(TestCollection::new(assembly.clone(), format!("Collection {}", index)));
        let class = Arc::new(TestClass::new(collection, format!("Class{}", index)));
        cases.push(case(&class, "Passes", passing()));
        cases.push(case(&class, "Fails", failing()));
    }

    let bus = Arc::new(MessageBus::new());
    let log: Log = Arc::default();
    bus.subscribe(Arc::new(recorder(log.clone(), |_, _| false)));

    let options = ExecutionOptions {
        parallelize_test_collections: true,
        max_parallel_threads: 2,
        ..ExecutionOptions::default()
    };
    let summary = TestAssemblyRunner::new(assembly, cases, options).run(bus.as_ref(), &CancellationSignal::new());
    let messages = log.lock().unwrap().clone();

    assert_eq!(summary.total, 8);
    assert_eq!(summary.failed, 4);
    assert_eq!(count(&messages, MessageKind::TestCollectionFinished), 4);
    assert_starting_finished_matched(&messages);
}

#[test]
fn test_panicking_sink_still_finishes_every_level() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = disposed.clone();
    let assembly = Arc::new(
        TestAssembly::new("Sample.Tests", None, None).with_fixture(
            Fixture::new("database", || Ok(json!("db"))).with_dispose(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ),
    );
    let collection = Arc::new(TestCollection::new(assembly.clone(), "Default"));
    let class = Arc::new(TestClass::new(collection, "Math"));

    let log: Log = Arc::default();
    let sink_log = log.clone();
    let sink = FnSink(move |message: &Message| {
        sink_log.lock().unwrap().push(message.clone());
        if message.is::<TestPassed>() {
            panic!("reporter crashed");
        }
        true
    });

    let cancellation = CancellationSignal::new();
    let cases = vec![case(&class, "Adds", passing()), case(&class, "Subtracts", passing())];
    TestAssemblyRunner::new(assembly, cases, ExecutionOptions::default()).run(&sink, &cancellation);

    let messages = log.lock().unwrap().clone();
    assert_starting_finished_matched(&messages);
    assert!(cancellation.is_cancelled());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(count(&messages, MessageKind::TestCaseStarting), 1);

    let error = messages.iter().find_map(|m| m.downcast::<ErrorMessage>()).unwrap();
    assert!(error.failure.messages[0].contains("reporter crashed"));
    assert_eq!(messages.last().map(Message::kind), Some(MessageKind::TestAssemblyFinished));
}
