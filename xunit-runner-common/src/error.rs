use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("{0} has already been disposed")]
    AlreadyDisposed(String),
}

impl SinkError {
    pub fn already_disposed(name: impl Into<String>) -> Self {
        Self::AlreadyDisposed(name.into())
    }
}

pub type Result<T> = std::result::Result<T, SinkError>;
