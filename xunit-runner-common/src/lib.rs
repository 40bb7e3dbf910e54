//! Runner-side support for xunit
//!
//! Delegating sinks that derive state from the message stream without
//! altering it, a console reporter, runner configuration and logging setup.

pub mod config;
pub mod error;
pub mod execution_summary;
pub mod logging;
pub mod sinks;

pub use config::RunnerConfig;
pub use error::{Result, SinkError};
pub use execution_summary::ExecutionSummary;
pub use sinks::{ConsoleReporter, DelegatingExecutionSummarySink, ExecutionSink, TestDiscoverySink};
