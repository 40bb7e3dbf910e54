//! Fixture lifetime for assembly, collection and class levels

use std::collections::HashMap;

use tracing::debug;

use crate::aggregator::ExceptionAggregator;
use crate::fault::Fault;
use crate::model::{ArgValue, Fixture};

/// A fixture whose value was created successfully and must be disposed
#[derive(Debug, Clone)]
pub struct CreatedFixture {
    pub fixture: Fixture,
    pub value: ArgValue,
}

/// Fixture values visible at one level; nearer levels shadow outer ones
#[derive(Debug, Clone, Default)]
pub struct FixtureScope {
    values: HashMap<String, ArgValue>,
}

impl FixtureScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope with `created` layered over this one
    pub fn child(&self, created: &[CreatedFixture]) -> FixtureScope {
        let mut values = self.values.clone();
        for entry in created {
            values.insert(entry.fixture.name().to_string(), entry.value.clone());
        }
        FixtureScope { values }
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Resolve constructor parameters by fixture name
    pub fn resolve(&self, names: &[String]) -> Result<Vec<ArgValue>, Fault> {
        let mut missing = Vec::new();
        let mut resolved = Vec::with_capacity(names.len());

        for name in names {
            match self.values.get(name) {
                Some(value) => resolved.push(value.clone()),
                None => missing.push(name.as_str()),
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(Fault::new(
                "TestClassException",
                format!(
                    "The following constructor parameters did not have matching fixture data: {}",
                    missing.join(", ")
                ),
            ))
        }
    }
}

/// Create every fixture, capturing failures in `aggregator`
pub fn create_fixtures(fixtures: &[Fixture], aggregator: &mut ExceptionAggregator) -> Vec<CreatedFixture> {
    let mut created = Vec::with_capacity(fixtures.len());

    for fixture in fixtures {
        if let Some(value) = aggregator.run(|| fixture.create()) {
            debug!("Created fixture '{}'", fixture.name());
            created.push(CreatedFixture {
                fixture: fixture.clone(),
                value,
            });
        }
    }

    created
}

/// Dispose fixtures in reverse creation order; the result holds any cleanup faults
pub fn dispose_fixtures(created: Vec<CreatedFixture>) -> ExceptionAggregator {
    let mut cleanup = ExceptionAggregator::new();

    for entry in created.into_iter().rev() {
        cleanup.run(|| entry.fixture.dispose(&entry.value));
    }

    cleanup
}
