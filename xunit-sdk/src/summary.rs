//! Run summaries
//!
//! A [`RunSummary`] holds the counters for one hierarchy scope. Children are
//! folded into parents by field-wise addition; containment is a tree, so no
//! test is ever counted twice.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Aggregated counters for one hierarchy scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
    pub skipped: usize,
    pub time: Duration,
}

impl RunSummary {
    pub fn new(total: usize, failed: usize, skipped: usize, time: Duration) -> Self {
        Self {
            total,
            failed,
            skipped,
            time,
        }
    }

    /// Record outcomes directly at this level
    pub fn record_outcome(&mut self, total: usize, failed: usize, skipped: usize, elapsed: Duration) {
        self.total += total;
        self.failed += failed;
        self.skipped += skipped;
        self.time += elapsed;
    }

    /// Fold a child scope's summary into this one
    pub fn aggregate(&mut self, child: RunSummary) {
        self.record_outcome(child.total, child.failed, child.skipped, child.time);
    }

    /// Parent summary with a child folded in
    pub fn merge(parent: RunSummary, child: RunSummary) -> RunSummary {
        let mut merged = parent;
        merged.aggregate(child);
        merged
    }

    pub fn passed(&self) -> usize {
        self.total.saturating_sub(self.failed + self.skipped)
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(self, rhs: RunSummary) -> RunSummary {
        RunSummary::merge(self, rhs)
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: RunSummary) {
        self.aggregate(rhs);
    }
}

impl std::iter::Sum for RunSummary {
    fn sum<I: Iterator<Item = RunSummary>>(iter: I) -> RunSummary {
        iter.fold(RunSummary::default(), RunSummary::merge)
    }
}
