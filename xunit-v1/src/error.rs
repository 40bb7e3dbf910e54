use thiserror::Error;

use xunit_runner_common::SinkError;
use xunit_sdk::CodecError;

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("Assembly file name must not be empty")]
    EmptyAssemblyFileName,

    #[error("Xunit1 has already been disposed")]
    AlreadyDisposed,

    #[error("Failed to create legacy executor: {0}")]
    ExecutorCreation(String),

    #[error("Legacy engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl LegacyError {
    pub fn executor_creation(message: impl Into<String>) -> Self {
        Self::ExecutorCreation(message.into())
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LegacyError>;
