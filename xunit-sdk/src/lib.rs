//! Execution core for xunit
//!
//! This crate implements the execution/aggregation pipeline: test cases are run
//! by a hierarchy of runners (assembly, collection, class, method, test case)
//! which publish typed messages through a synchronous message bus, aggregate
//! run summaries bottom-up, and contain faults with exception aggregators.

pub mod aggregator;
pub mod bus;
pub mod cancellation;
pub mod codec;
pub mod error;
pub mod fault;
pub mod messages;
pub mod metadata;
pub mod model;
pub mod runners;
pub mod summary;
pub mod unique_id;

pub use aggregator::ExceptionAggregator;
pub use bus::{MessageBus, MessageSink};
pub use cancellation::{CancellationSignal, ManualResetEvent};
pub use codec::{MethodLookup, TestCaseCodec};
pub use error::{CodecError, DiscoveryError};
pub use fault::{FailureInformation, Fault};
pub use messages::{Message, MessageHandlerArgs, MessageKind, MessageType, TestOutcome};
pub use metadata::{MetadataInspector, TestCaseFactory, TraitAttributeCache, TraitDiscovererRegistry};
pub use model::{
    ArgValue, Fixture, SourceInformation, TestAssembly, TestBody, TestCase, TestClass,
    TestCollection, TestMethod, Traits,
};
pub use runners::{ExecutionOptions, RunContext, TestAssemblyRunner, TestCaseRunner};
pub use summary::RunSummary;
