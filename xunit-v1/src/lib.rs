//! Bridge for legacy (v1) test engines
//!
//! A legacy engine reports discovery and results as trees of named nodes.
//! This crate converts those nodes into xunit metadata and messages so that
//! runners see legacy assemblies exactly like native ones.

pub mod conversion;
pub mod error;
pub mod executor;
pub mod front_controller;
pub mod handlers;
pub mod node;

pub use conversion::LegacyModel;
pub use error::{LegacyError, Result};
pub use executor::{LegacyCallbackHandler, LegacyExecutor};
pub use front_controller::Xunit1;
pub use handlers::{LegacyRunSummary, NodeCaptureHandler, TestClassCallbackHandler};
pub use node::LegacyNode;
