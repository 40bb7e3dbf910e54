//! Delegating sinks and message consumers

mod console_reporter;
mod discovery_sink;
mod execution_summary_sink;

pub use console_reporter::ConsoleReporter;
pub use discovery_sink::TestDiscoverySink;
pub use execution_summary_sink::DelegatingExecutionSummarySink;

use xunit_sdk::{ManualResetEvent, MessageSink};

use crate::error::Result;
use crate::execution_summary::ExecutionSummary;

/// A sink that observes a whole assembly run
pub trait ExecutionSink: MessageSink {
    /// The summary, once the assembly has finished
    fn execution_summary(&self) -> Option<ExecutionSummary>;

    /// Set when the assembly has finished
    fn finished(&self) -> &ManualResetEvent;

    /// Release the sink; a second call fails
    fn dispose(&self) -> Result<()>;
}
