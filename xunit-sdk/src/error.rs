//! Error types for discovery and test case persistence

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Method {class_name}.{method_name} has no Fact attribute")]
    MissingFactAttribute {
        class_name: String,
        method_name: String,
    },

    #[error("Invalid value for '{argument}' on {class_name}.{method_name}: {message}")]
    InvalidAttributeArgument {
        class_name: String,
        method_name: String,
        argument: String,
        message: String,
    },
}

impl DiscoveryError {
    pub fn missing_fact_attribute(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::MissingFactAttribute {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn invalid_attribute_argument(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        argument: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttributeArgument {
            class_name: class_name.into(),
            method_name: method_name.into(),
            argument: argument.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed test case token: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported test case token version {0}")]
    UnsupportedVersion(u32),

    #[error("Unknown test method {class_name}.{method_name}")]
    UnknownMethod {
        class_name: String,
        method_name: String,
    },

    #[error("Test case identity changed: token has {expected}, resolved to {actual}")]
    IdentityMismatch { expected: String, actual: String },
}

impl CodecError {
    pub fn unknown_method(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::UnknownMethod {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn identity_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IdentityMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
