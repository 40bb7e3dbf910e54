//! Exception aggregation
//!
//! An [`ExceptionAggregator`] is scoped to one unit of work (assembly,
//! collection, class, method or test case). Faults raised while running
//! actions are captured instead of propagated, so sibling work still runs.

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::fault::{FailureInformation, Fault};

/// Append-only collection of faults for one execution scope
#[derive(Debug, Clone, Default)]
pub struct ExceptionAggregator {
    faults: Vec<Fault>,
}

impl ExceptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child scope which starts with the parent's faults
    pub fn from_parent(parent: &ExceptionAggregator) -> Self {
        parent.clone()
    }

    pub fn add(&mut self, fault: Fault) {
        debug!("Captured fault {}", fault);
        self.faults.push(fault);
    }

    /// Absorb the faults of another aggregator
    pub fn aggregate(&mut self, other: &ExceptionAggregator) {
        self.faults.extend(other.faults.iter().cloned());
    }

    /// Run an action, capturing an `Err` or a panic as a fault.
    ///
    /// Returns `Some` with the action's value when it completed normally.
    pub fn run<T>(&mut self, action: impl FnOnce() -> Result<T, Fault>) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(fault)) => {
                self.add(fault);
                None
            }
            Err(payload) => {
                self.add(Fault::from_panic(payload));
                None
            }
        }
    }

    pub fn has_exceptions(&self) -> bool {
        !self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    pub fn clear(&mut self) {
        self.faults.clear();
    }

    /// The captured faults as a single reportable fault
    pub fn to_failure(&self) -> Option<Fault> {
        Fault::aggregate(self.faults.clone())
    }

    pub fn to_failure_information(&self) -> Option<FailureInformation> {
        self.to_failure().map(|fault| FailureInformation::from_fault(&fault))
    }
}
