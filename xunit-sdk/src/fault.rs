//! Fault values
//!
//! Faults raised by test bodies, fixtures and orchestration code travel as
//! plain values. A fault may carry nested faults which were raised while it
//! was being handled; [`FailureInformation`] flattens such a tree into the
//! parallel arrays used by failure messages.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Fault type used when several independent faults are reported as one
pub const AGGREGATE_FAULT_TYPE: &str = "AggregateFault";

/// Fault type used for panics caught at a layer boundary
pub const PANIC_FAULT_TYPE: &str = "Panic";

/// Fault type used when a test invocation exceeds its timeout
pub const TIMEOUT_FAULT_TYPE: &str = "TestTimeoutException";

/// A captured fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Type name of the fault (e.g. `AssertionFailed`)
    pub fault_type: String,

    /// Human-readable message
    pub message: String,

    /// Optional stack trace or backtrace text
    pub stack_trace: Option<String>,

    /// Faults raised while this fault was being handled
    pub nested: Vec<Fault>,
}

impl Fault {
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fault_type: fault_type.into(),
            message: message.into(),
            stack_trace: None,
            nested: Vec::new(),
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Record `fault` as having been raised while handling `self`
    pub fn with_nested(mut self, fault: Fault) -> Self {
        self.nested.push(fault);
        self
    }

    /// Timeout fault for a test invocation
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            TIMEOUT_FAULT_TYPE,
            format!("Test execution timed out after {} milliseconds", timeout_ms),
        )
    }

    /// Combine several faults into one; a single fault is returned unchanged
    pub fn aggregate(mut faults: Vec<Fault>) -> Option<Self> {
        match faults.len() {
            0 => None,
            1 => faults.pop(),
            count => Some(Self {
                fault_type: AGGREGATE_FAULT_TYPE.to_string(),
                message: format!("{} faults occurred", count),
                stack_trace: None,
                nested: faults,
            }),
        }
    }

    /// Convert a caught panic payload into a fault
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panicked with a non-string payload".to_string()
        };

        Self::new(PANIC_FAULT_TYPE, message)
    }

    /// Convert an error and its source chain into a fault tree
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut fault = Self::new(error_type_name(error), error.to_string());
        if let Some(source) = error.source() {
            fault.nested.push(Self::from_error(source));
        }
        fault
    }
}

fn error_type_name(error: &dyn std::error::Error) -> String {
    // Debug output starts with the type or variant name for derived impls
    let debug = format!("{:?}", error);
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Error")
        .to_string()
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.fault_type, self.message)
    }
}

impl std::error::Error for Fault {}

/// Flattened fault tree
///
/// Entry `i` describes one fault; `exception_parent_indices[i]` is the index
/// of the fault it was raised while handling, or `-1` for a root fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInformation {
    pub exception_types: Vec<String>,
    pub messages: Vec<String>,
    pub stack_traces: Vec<Option<String>>,
    pub exception_parent_indices: Vec<i32>,
}

impl FailureInformation {
    pub fn from_fault(fault: &Fault) -> Self {
        let mut info = Self::default();
        info.push(fault, -1);
        info
    }

    fn push(&mut self, fault: &Fault, parent: i32) {
        let index = self.exception_types.len() as i32;

        self.exception_types.push(fault.fault_type.clone());
        self.messages.push(fault.message.clone());
        self.stack_traces.push(fault.stack_trace.clone());
        self.exception_parent_indices.push(parent);

        for nested in &fault.nested {
            self.push(nested, index);
        }
    }

    pub fn len(&self) -> usize {
        self.exception_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exception_types.is_empty()
    }

    /// One-line description of the root fault
    pub fn summary_message(&self) -> String {
        match (self.exception_types.first(), self.messages.first()) {
            (Some(fault_type), Some(message)) => format!("{} : {}", fault_type, message),
            _ => String::new(),
        }
    }
}

impl From<&Fault> for FailureInformation {
    fn from(fault: &Fault) -> Self {
        Self::from_fault(fault)
    }
}
