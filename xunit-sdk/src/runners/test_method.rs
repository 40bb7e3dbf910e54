use std::sync::Arc;

use tracing::debug;

use super::{RunContext, TestCaseRunner};
use crate::aggregator::ExceptionAggregator;
use crate::messages::{TestMethodFinished, TestMethodStarting};
use crate::model::{ArgValue, TestCase, TestMethod};
use crate::summary::RunSummary;

/// Runs the test cases of one method in order
pub struct TestMethodRunner<'a> {
    method: &'a Arc<TestMethod>,
    test_cases: &'a [Arc<TestCase>],
    constructor_arguments: &'a [ArgValue],
}

impl<'a> TestMethodRunner<'a> {
    pub fn new(
        method: &'a Arc<TestMethod>,
        test_cases: &'a [Arc<TestCase>],
        constructor_arguments: &'a [ArgValue],
    ) -> Self {
        Self {
            method,
            test_cases,
            constructor_arguments,
        }
    }

    pub fn run(&self, ctx: &RunContext<'_>, parent: &ExceptionAggregator) -> RunSummary {
        let class_id = self.method.class.unique_id.clone();
        let method_id = self.method.unique_id.clone();
        let mut summary = RunSummary::default();

        let started = ctx.publish(TestMethodStarting {
            test_class_unique_id: class_id.clone(),
            test_method_unique_id: method_id.clone(),
            test_method: self.method.name.clone(),
        });

        if started {
            debug!("Running {} ({} cases)", self.method.name, self.test_cases.len());
            ctx.run_children(&self.method.name, || {
                for test_case in self.test_cases {
                    if ctx.is_cancelled() {
                        break;
                    }
                    summary += TestCaseRunner::new(test_case, self.constructor_arguments).run(ctx, parent);
                }
            });
        }

        ctx.publish(TestMethodFinished {
            test_class_unique_id: class_id,
            test_method_unique_id: method_id,
            summary,
        });

        summary
    }
}
