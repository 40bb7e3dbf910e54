use serde::{Deserialize, Serialize};
use std::time::Duration;

use xunit_sdk::RunSummary;

/// Process-level result of running one assembly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub failed: usize,
    pub skipped: usize,
    pub time: Duration,
    /// Error messages and cleanup failures seen during the run
    pub errors: usize,
}

impl ExecutionSummary {
    pub fn from_run(summary: RunSummary, errors: usize) -> Self {
        Self {
            total: summary.total,
            failed: summary.failed,
            skipped: summary.skipped,
            time: summary.time,
            errors,
        }
    }

    pub fn passed(&self) -> usize {
        self.total.saturating_sub(self.failed + self.skipped)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}
