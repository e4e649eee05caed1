use thiserror::Error;

use crate::db::{ExecError, ExecErrorKind};

/// Failure categories surfaced by every public operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The pool could not hand out a usable connection.
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("query failure: {0}")]
    Query(String),
    #[error("insert failure: {0}")]
    Insert(String),
    #[error("update failure: {0}")]
    Update(String),
    #[error("delete failure: {0}")]
    Delete(String),
    /// Bad input: unknown model or relation, unusable id, invalid schema.
    #[error("validation failure: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    pub fn message(&self) -> &str {
        match self {
            AdapterError::Connection(m)
            | AdapterError::Query(m)
            | AdapterError::Insert(m)
            | AdapterError::Update(m)
            | AdapterError::Delete(m)
            | AdapterError::Validation(m) => m,
        }
    }

    /// Re-label a statement failure with the category of the operation that
    /// issued it. Connection and validation failures keep their category.
    pub fn within(self, category: fn(String) -> AdapterError) -> AdapterError {
        match self {
            AdapterError::Connection(_) | AdapterError::Validation(_) => self,
            AdapterError::Query(m)
            | AdapterError::Insert(m)
            | AdapterError::Update(m)
            | AdapterError::Delete(m) => category(m),
        }
    }
}

impl From<ExecError> for AdapterError {
    fn from(err: ExecError) -> Self {
        match err.kind {
            ExecErrorKind::Connection => AdapterError::Connection(err.message),
            ExecErrorKind::Statement => AdapterError::Query(err.message),
        }
    }
}
