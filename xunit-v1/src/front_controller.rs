//! Discovery and execution of legacy (v1) test assemblies
//!
//! [`Xunit1`] drives a [`LegacyExecutor`] and re-emits everything it reports as
//! the same messages the native runners publish. Tests are grouped by class
//! name only, since the legacy engine knows classes by nothing else.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use xunit_runner_common::TestDiscoverySink;
use xunit_sdk::messages::{
    DiagnosticMessage, DiscoveryComplete, ErrorMessage, TestAssemblyFinished, TestAssemblyStarting, TestCaseDiscovered,
    TestClassFinished, TestClassStarting, TestCollectionFinished, TestCollectionStarting,
};
use xunit_sdk::metadata::{NullSourceInformationProvider, SourceInformationProvider};
use xunit_sdk::runners::test_environment;
use xunit_sdk::{ExceptionAggregator, Fault, MessageSink, TestCase, TestCaseCodec, TestClass, TestCollection};

use crate::conversion::LegacyModel;
use crate::error::{LegacyError, Result};
use crate::executor::LegacyExecutor;
use crate::handlers::{LegacyRunSummary, NodeCaptureHandler, TestClassCallbackHandler};

type ExecutorFactory = Box<dyn Fn() -> Result<Arc<dyn LegacyExecutor>> + Send + Sync>;

/// Front controller for one legacy test assembly
pub struct Xunit1 {
    assembly_file_name: String,
    model: LegacyModel,
    factory: ExecutorFactory,
    executor: OnceCell<Arc<dyn LegacyExecutor>>,
    source_provider: Arc<dyn SourceInformationProvider>,
    diagnostic_sink: Option<Arc<dyn MessageSink>>,
    codec: TestCaseCodec,
    disposed: AtomicBool,
}

impl Xunit1 {
    /// The executor is created by `factory` on first use
    pub fn new(
        assembly_file_name: impl Into<String>,
        config_file_name: Option<String>,
        factory: impl Fn() -> Result<Arc<dyn LegacyExecutor>> + Send + Sync + 'static,
    ) -> Result<Self> {
        let assembly_file_name = assembly_file_name.into();
        if assembly_file_name.is_empty() {
            return Err(LegacyError::EmptyAssemblyFileName);
        }

        let model = LegacyModel::new(&assembly_file_name, config_file_name.as_deref());
        Ok(Self {
            assembly_file_name,
            model,
            factory: Box::new(factory),
            executor: OnceCell::new(),
            source_provider: Arc::new(NullSourceInformationProvider),
            diagnostic_sink: None,
            codec: TestCaseCodec::new(),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn with_source_provider(mut self, provider: Arc<dyn SourceInformationProvider>) -> Self {
        self.source_provider = provider;
        self
    }

    pub fn with_diagnostic_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.diagnostic_sink = Some(sink);
        self
    }

    pub fn assembly_file_name(&self) -> &str {
        &self.assembly_file_name
    }

    fn executor(&self) -> Result<&Arc<dyn LegacyExecutor>> {
        self.executor.get_or_try_init(|| {
            debug!("Creating legacy executor for {}", self.assembly_file_name);
            (self.factory)()
        })
    }

    pub fn test_framework_display_name(&self) -> Result<String> {
        Ok(self.executor()?.test_framework_display_name())
    }

    fn diagnostic(&self, message: String) {
        if let Some(sink) = &self.diagnostic_sink {
            sink.on_message(&DiagnosticMessage { message }.into());
        }
    }

    /// Discover every test in the assembly
    pub fn find(&self, include_source_information: bool, sink: &dyn MessageSink) {
        self.find_filtered(|_| true, include_source_information, sink);
    }

    /// Discover the tests of one class
    pub fn find_type(&self, type_name: &str, include_source_information: bool, sink: &dyn MessageSink) {
        self.find_filtered(|case| case.class().name == type_name, include_source_information, sink);
    }

    fn find_filtered(&self, filter: impl Fn(&TestCase) -> bool, include_source_information: bool, sink: &dyn MessageSink) {
        let mut aggregator = ExceptionAggregator::new();
        aggregator.run(|| self.discover(&filter, include_source_information, sink));

        if let Some(failure) = aggregator.to_failure_information() {
            warn!("Legacy discovery of {} faulted: {}", self.assembly_file_name, failure.summary_message());
            sink.on_message(&ErrorMessage { failure }.into());
        }
        sink.on_message(&DiscoveryComplete.into());
    }

    fn discover(
        &self,
        filter: &dyn Fn(&TestCase) -> bool,
        include_source_information: bool,
        sink: &dyn MessageSink,
    ) -> std::result::Result<(), Fault> {
        let handler = Arc::new(NodeCaptureHandler::new());
        self.executor()
            .and_then(|executor| executor.enumerate_tests(handler.clone()))
            .map_err(|e| Fault::from_error(&e))?;

        let Some(document) = handler.take() else {
            return Ok(());
        };

        let source_provider = include_source_information.then(|| self.source_provider.as_ref());
        for method in document.descendants("method") {
            match self.model.test_case_from_node(method, source_provider) {
                Some(test_case) if filter(&test_case) => {
                    sink.on_message(
                        &TestCaseDiscovered {
                            test_case: Arc::new(test_case),
                        }
                        .into(),
                    );
                }
                Some(_) => {}
                None => self.diagnostic(format!(
                    "Skipping legacy method node without type or method name: {:?}",
                    method.attr("name")
                )),
            }
        }
        Ok(())
    }

    /// Discover every test, then run them all
    pub fn run_all(&self, sink: Arc<dyn MessageSink>) -> Result<LegacyRunSummary> {
        let discovery_sink = TestDiscoverySink::new();
        self.find(false, &discovery_sink);
        discovery_sink.finished().wait();

        let results = self.run(&discovery_sink.test_cases(), sink);
        discovery_sink.dispose()?;
        Ok(results)
    }

    /// Run the given test cases; nothing is reported when there are none
    pub fn run(&self, test_cases: &[Arc<TestCase>], sink: Arc<dyn MessageSink>) -> LegacyRunSummary {
        let mut results = LegacyRunSummary::default();
        let Some(first) = test_cases.first() else {
            return results;
        };
        let collection = first.collection().clone();
        let assembly = collection.assembly.clone();

        info!("Running {} legacy test cases from {}", test_cases.len(), assembly.name);

        let mut aggregator = ExceptionAggregator::new();
        aggregator.run(|| {
            let starting = TestAssemblyStarting {
                assembly_unique_id: assembly.unique_id.clone(),
                assembly_name: assembly.name.clone(),
                assembly_path: assembly.path.clone(),
                config_file_path: assembly.config_file_path.clone(),
                start_time: Utc::now(),
                test_environment: test_environment(),
                test_framework_display_name: self.test_framework_display_name().map_err(|e| Fault::from_error(&e))?,
            };

            if sink.on_message(&starting.into()) {
                results = self.run_test_collection(&collection, test_cases, &sink);
            } else {
                results.continue_running = false;
            }
            Ok(())
        });

        if let Some(failure) = aggregator.to_failure_information() {
            warn!("Legacy run of {} faulted: {}", assembly.name, failure.summary_message());
            sink.on_message(&ErrorMessage { failure }.into());
        }

        let finished = TestAssemblyFinished {
            assembly_unique_id: assembly.unique_id.clone(),
            assembly_name: assembly.name.clone(),
            assembly_path: assembly.path.clone(),
            summary: results.summary,
        };
        results.continue_running &= sink.on_message(&finished.into());
        results
    }

    fn run_test_collection(
        &self,
        collection: &Arc<TestCollection>,
        test_cases: &[Arc<TestCase>],
        sink: &Arc<dyn MessageSink>,
    ) -> LegacyRunSummary {
        let mut results = LegacyRunSummary {
            continue_running: sink.on_message(
                &TestCollectionStarting {
                    assembly_unique_id: collection.assembly.unique_id.clone(),
                    test_collection_unique_id: collection.unique_id.clone(),
                    test_collection_display_name: collection.display_name.clone(),
                }
                .into(),
            ),
            ..LegacyRunSummary::default()
        };

        let mut aggregator = ExceptionAggregator::new();
        if results.continue_running {
            for (class, cases) in group_by_class_name(test_cases) {
                let class_results = self.run_test_class(&class, &cases, sink, &mut aggregator);
                results.aggregate(class_results);
                if !class_results.continue_running || aggregator.has_exceptions() {
                    break;
                }
            }
        }

        if let Some(failure) = aggregator.to_failure_information() {
            warn!("Legacy collection {} faulted: {}", collection.display_name, failure.summary_message());
            sink.on_message(&ErrorMessage { failure }.into());
        }

        let finished = TestCollectionFinished {
            assembly_unique_id: collection.assembly.unique_id.clone(),
            test_collection_unique_id: collection.unique_id.clone(),
            summary: results.summary,
        };
        results.continue_running = sink.on_message(&finished.into()) && results.continue_running;
        results
    }

    fn run_test_class(
        &self,
        class: &Arc<TestClass>,
        test_cases: &[Arc<TestCase>],
        sink: &Arc<dyn MessageSink>,
        aggregator: &mut ExceptionAggregator,
    ) -> LegacyRunSummary {
        let handler = Arc::new(TestClassCallbackHandler::new(test_cases, sink.clone()));
        let started = sink.on_message(
            &TestClassStarting {
                test_collection_unique_id: class.collection.unique_id.clone(),
                test_class_unique_id: class.unique_id.clone(),
                test_class: class.name.clone(),
            }
            .into(),
        );

        if started {
            let method_names: Vec<String> = test_cases.iter().map(|case| case.method.name.clone()).collect();
            debug!("Running legacy class {} ({} methods)", class.name, method_names.len());

            aggregator.run(|| {
                self.executor()
                    .and_then(|executor| executor.run_tests(&class.name, &method_names, handler.clone()))
                    .map_err(|e| Fault::from_error(&e))?;
                handler.last_node_arrived().wait();
                Ok(())
            });
            handler.finish();
        }

        let mut results = handler.results();
        results.continue_running &= started;
        let finished = TestClassFinished {
            test_collection_unique_id: class.collection.unique_id.clone(),
            test_class_unique_id: class.unique_id.clone(),
            summary: results.summary,
        };
        results.continue_running = sink.on_message(&finished.into()) && results.continue_running;
        results
    }

    pub fn serialize(&self, test_case: &TestCase) -> Result<String> {
        Ok(self.codec.encode(test_case)?)
    }

    /// Rebuild a test case from its token using legacy metadata names
    pub fn deserialize(&self, token: &str) -> Result<TestCase> {
        Ok(self.codec.decode(token, &self.model)?)
    }

    /// Release the executor; a second call fails
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(LegacyError::AlreadyDisposed);
        }
        if let Some(executor) = self.executor.get() {
            executor.dispose();
        }
        Ok(())
    }
}

/// Group cases by class name, keeping first-appearance order
fn group_by_class_name(test_cases: &[Arc<TestCase>]) -> Vec<(Arc<TestClass>, Vec<Arc<TestCase>>)> {
    let mut groups: IndexMap<&str, (Arc<TestClass>, Vec<Arc<TestCase>>)> = IndexMap::new();
    for case in test_cases {
        let class = case.class();
        groups
            .entry(class.name.as_str())
            .or_insert_with(|| (class.clone(), Vec::new()))
            .1
            .push(case.clone());
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xunit_sdk::{TestAssembly, TestMethod};

    #[test]
    fn test_grouping_is_by_class_name() {
        let assembly = Arc::new(TestAssembly::new("Legacy.Tests", None, None));
        let collection = Arc::new(TestCollection::new(assembly, "Default"));
        // two distinct class instances sharing a name
        let first = Arc::new(TestClass::new(collection.clone(), "Legacy.Math"));
        let second = Arc::new(TestClass::new(collection, "Legacy.Math"));

        let cases = vec![
            Arc::new(TestCase::new(Arc::new(TestMethod::new(first, "Adds")), Vec::new())),
            Arc::new(TestCase::new(Arc::new(TestMethod::new(second, "Subtracts")), Vec::new())),
        ];

        let groups = group_by_class_name(&cases);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_empty_file_name_is_rejected() {
        let result = Xunit1::new("", None, || Err(LegacyError::engine("unused")));
        assert!(matches!(result, Err(LegacyError::EmptyAssemblyFileName)));
    }
}
