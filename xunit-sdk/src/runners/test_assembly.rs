//! Assembly runner, the root of a run
//!
//! Faults while coordinating the assembly are reported as an
//! [`ErrorMessage`] and never escape; Finished is always published.

use std::panic;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::fixtures::{create_fixtures, dispose_fixtures, FixtureScope};
use super::{group_cases, test_environment, ExecutionOptions, RunContext, TestCollectionRunner};
use crate::aggregator::ExceptionAggregator;
use crate::bus::MessageSink;
use crate::cancellation::CancellationSignal;
use crate::fault::Fault;
use crate::messages::{ErrorMessage, TestAssemblyCleanupFailure, TestAssemblyFinished, TestAssemblyStarting};
use crate::model::{TestAssembly, TestCase, TestCollection};
use crate::summary::RunSummary;

pub const DEFAULT_FRAMEWORK_DISPLAY_NAME: &str = concat!("xunit-sdk ", env!("CARGO_PKG_VERSION"));

type CollectionGroup = (Arc<TestCollection>, Vec<Arc<TestCase>>);

pub struct TestAssemblyRunner {
    assembly: Arc<TestAssembly>,
    test_cases: Vec<Arc<TestCase>>,
    options: ExecutionOptions,
    framework_display_name: String,
}

impl TestAssemblyRunner {
    pub fn new(assembly: Arc<TestAssembly>, test_cases: Vec<Arc<TestCase>>, options: ExecutionOptions) -> Self {
        Self {
            assembly,
            test_cases,
            options,
            framework_display_name: DEFAULT_FRAMEWORK_DISPLAY_NAME.to_string(),
        }
    }

    pub fn with_framework_display_name(mut self, name: impl Into<String>) -> Self {
        self.framework_display_name = name.into();
        self
    }

    pub fn assembly(&self) -> &Arc<TestAssembly> {
        &self.assembly
    }

    pub fn test_cases(&self) -> &[Arc<TestCase>] {
        &self.test_cases
    }

    /// Run every test case, publishing to `sink`
    pub fn run(&self, sink: &dyn MessageSink, cancellation: &CancellationSignal) -> RunSummary {
        let ctx = RunContext::new(sink, cancellation, &self.options);
        let assembly_id = self.assembly.unique_id.clone();
        let mut summary = RunSummary::default();

        info!(
            "Running {} ({} test cases)",
            self.assembly.name,
            self.test_cases.len()
        );

        let started = ctx.publish(TestAssemblyStarting {
            assembly_unique_id: assembly_id.clone(),
            assembly_name: self.assembly.name.clone(),
            assembly_path: self.assembly.path.clone(),
            config_file_path: self.assembly.config_file_path.clone(),
            start_time: Utc::now(),
            test_environment: test_environment(),
            test_framework_display_name: self.framework_display_name.clone(),
        });

        if started {
            let mut coordination = ExceptionAggregator::new();
            coordination.run(|| self.run_assembly(&ctx, &mut summary));

            if let Some(failure) = coordination.to_failure_information() {
                warn!("Run of {} faulted: {}", self.assembly.name, failure.summary_message());
                ctx.publish(ErrorMessage { failure });
            }
        }

        ctx.publish(TestAssemblyFinished {
            assembly_unique_id: assembly_id,
            assembly_name: self.assembly.name.clone(),
            assembly_path: self.assembly.path.clone(),
            summary,
        });

        info!(
            "Finished {}: {} total, {} failed, {} skipped in {:?}",
            self.assembly.name, summary.total, summary.failed, summary.skipped, summary.time
        );
        summary
    }

    fn run_assembly(&self, ctx: &RunContext<'_>, summary: &mut RunSummary) -> Result<(), Fault> {
        self.validate()?;

        let mut setup = ExceptionAggregator::new();
        let created = create_fixtures(&self.assembly.fixtures, &mut setup);
        let scope = FixtureScope::new().child(&created);

        ctx.run_children(&self.assembly.name, || {
            let groups = group_cases(&self.test_cases, |case| case.collection());
            if self.options.parallelize_test_collections && groups.len() > 1 {
                self.run_parallel(ctx, groups, &scope, &setup, summary);
            } else {
                for (collection, cases) in &groups {
                    if ctx.is_cancelled() {
                        debug!("Cancelled before {}", collection.display_name);
                        break;
                    }
                    *summary += TestCollectionRunner::new(collection, cases).run(ctx, &scope, &setup);
                }
            }
        });

        let cleanup = dispose_fixtures(created);
        if let Some(failure) = cleanup.to_failure_information() {
            ctx.publish(TestAssemblyCleanupFailure {
                assembly_unique_id: self.assembly.unique_id.clone(),
                failure,
            });
        }

        Ok(())
    }

    fn run_parallel(
        &self,
        ctx: &RunContext<'_>,
        groups: Vec<CollectionGroup>,
        scope: &FixtureScope,
        setup: &ExceptionAggregator,
        summary: &mut RunSummary,
    ) {
        let threads = self.options.effective_max_threads();
        debug!("Running {} collections on up to {} threads", groups.len(), threads);

        for batch in groups.chunks(threads) {
            if ctx.is_cancelled() {
                break;
            }

            let results: Vec<thread::Result<Option<RunSummary>>> = thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(collection, cases)| {
                        s.spawn(move || {
                            if ctx.is_cancelled() {
                                return None;
                            }
                            Some(TestCollectionRunner::new(collection, cases).run(ctx, scope, setup))
                        })
                    })
                    .collect();
                handles.into_iter().map(|handle| handle.join()).collect()
            });

            for result in results {
                match result {
                    Ok(Some(collection_summary)) => *summary += collection_summary,
                    Ok(None) => {}
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
        }
    }

    fn validate(&self) -> Result<(), Fault> {
        let foreign: Vec<&str> = self
            .test_cases
            .iter()
            .filter(|case| case.assembly().unique_id != self.assembly.unique_id)
            .map(|case| case.display_name.as_str())
            .collect();

        if foreign.is_empty() {
            Ok(())
        } else {
            Err(Fault::new(
                "InvalidOperationException",
                format!(
                    "Test cases do not belong to assembly '{}': {}",
                    self.assembly.name,
                    foreign.join(", ")
                ),
            ))
        }
    }
}
