use std::sync::Arc;

use tracing::{debug, warn};

use super::fixtures::{create_fixtures, dispose_fixtures, FixtureScope};
use super::{group_cases, RunContext, TestMethodRunner};
use crate::aggregator::ExceptionAggregator;
use crate::messages::{TestClassCleanupFailure, TestClassFinished, TestClassStarting};
use crate::model::{TestCase, TestClass};
use crate::summary::RunSummary;

/// Runs every method of one class with the class fixtures in scope
pub struct TestClassRunner<'a> {
    class: &'a Arc<TestClass>,
    test_cases: &'a [Arc<TestCase>],
}

impl<'a> TestClassRunner<'a> {
    pub fn new(class: &'a Arc<TestClass>, test_cases: &'a [Arc<TestCase>]) -> Self {
        Self { class, test_cases }
    }

    pub fn run(&self, ctx: &RunContext<'_>, scope: &FixtureScope, parent: &ExceptionAggregator) -> RunSummary {
        let collection_id = self.class.collection.unique_id.clone();
        let class_id = self.class.unique_id.clone();
        let mut summary = RunSummary::default();

        let started = ctx.publish(TestClassStarting {
            test_collection_unique_id: collection_id.clone(),
            test_class_unique_id: class_id.clone(),
            test_class: self.class.name.clone(),
        });

        if started {
            let mut aggregator = ExceptionAggregator::from_parent(parent);
            let created = create_fixtures(&self.class.fixtures, &mut aggregator);
            let scope = scope.child(&created);

            let constructor_arguments = aggregator
                .run(|| scope.resolve(&self.class.constructor_parameters))
                .unwrap_or_default();
            if aggregator.has_exceptions() {
                warn!("Setup of {} failed; its tests will be reported as failed", self.class.name);
            }

            ctx.run_children(&self.class.name, || {
                for (method, cases) in group_cases(self.test_cases, |case| &case.method) {
                    if ctx.is_cancelled() {
                        debug!("Cancelled before {}", method.name);
                        break;
                    }
                    summary += TestMethodRunner::new(&method, &cases, &constructor_arguments).run(ctx, &aggregator);
                }
            });

            let cleanup = dispose_fixtures(created);
            if let Some(failure) = cleanup.to_failure_information() {
                ctx.publish(TestClassCleanupFailure {
                    test_class_unique_id: class_id.clone(),
                    failure,
                });
            }
        }

        ctx.publish(TestClassFinished {
            test_collection_unique_id: collection_id,
            test_class_unique_id: class_id,
            summary,
        });

        summary
    }
}
