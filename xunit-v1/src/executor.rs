//! Capabilities of a legacy execution engine
//!
//! The engine may live in another process or sandbox; the bridge only needs
//! enumeration and run-by-method-name, both reporting through callbacks.

use std::sync::Arc;

use crate::error::Result;
use crate::node::LegacyNode;

/// Receives result nodes from the engine.
///
/// Returning `false` asks the engine to stop.
pub trait LegacyCallbackHandler: Send + Sync {
    fn on_node(&self, node: &LegacyNode) -> bool;
}

pub trait LegacyExecutor: Send + Sync {
    fn test_framework_display_name(&self) -> String;

    /// Report every test as one `assembly` document
    fn enumerate_tests(&self, handler: Arc<dyn LegacyCallbackHandler>) -> Result<()>;

    /// Run the named methods of one class.
    ///
    /// The engine reports `start` and `test` nodes as tests run and a final
    /// `class` node; it may do so from another thread after returning.
    fn run_tests(&self, type_name: &str, method_names: &[String], handler: Arc<dyn LegacyCallbackHandler>) -> Result<()>;

    fn dispose(&self) {}
}
