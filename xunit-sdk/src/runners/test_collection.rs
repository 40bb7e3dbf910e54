use std::sync::Arc;

use tracing::debug;

use super::fixtures::{create_fixtures, dispose_fixtures, FixtureScope};
use super::{group_cases, RunContext, TestClassRunner};
use crate::aggregator::ExceptionAggregator;
use crate::messages::{TestCollectionCleanupFailure, TestCollectionFinished, TestCollectionStarting};
use crate::model::{TestCase, TestCollection};
use crate::summary::RunSummary;

/// Runs every class of one collection
pub struct TestCollectionRunner<'a> {
    collection: &'a Arc<TestCollection>,
    test_cases: &'a [Arc<TestCase>],
}

impl<'a> TestCollectionRunner<'a> {
    pub fn new(collection: &'a Arc<TestCollection>, test_cases: &'a [Arc<TestCase>]) -> Self {
        Self { collection, test_cases }
    }

    pub fn run(&self, ctx: &RunContext<'_>, scope: &FixtureScope, parent: &ExceptionAggregator) -> RunSummary {
        let assembly_id = self.collection.assembly.unique_id.clone();
        let collection_id = self.collection.unique_id.clone();
        let mut summary = RunSummary::default();

        let started = ctx.publish(TestCollectionStarting {
            assembly_unique_id: assembly_id.clone(),
            test_collection_unique_id: collection_id.clone(),
            test_collection_display_name: self.collection.display_name.clone(),
        });

        if started {
            let mut aggregator = ExceptionAggregator::from_parent(parent);
            let created = create_fixtures(&self.collection.fixtures, &mut aggregator);
            let scope = scope.child(&created);

            ctx.run_children(&self.collection.display_name, || {
                for (class, cases) in group_cases(self.test_cases, |case| case.class()) {
                    if ctx.is_cancelled() {
                        debug!("Cancelled before {}", class.name);
                        break;
                    }
                    summary += TestClassRunner::new(&class, &cases).run(ctx, &scope, &aggregator);
                }
            });

            let cleanup = dispose_fixtures(created);
            if let Some(failure) = cleanup.to_failure_information() {
                ctx.publish(TestCollectionCleanupFailure {
                    test_collection_unique_id: collection_id.clone(),
                    failure,
                });
            }
        }

        ctx.publish(TestCollectionFinished {
            assembly_unique_id: assembly_id,
            test_collection_unique_id: collection_id,
            summary,
        });

        summary
    }
}
