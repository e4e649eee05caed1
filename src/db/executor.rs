use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ast::SqlParam;

/// One result row, keyed by column name.
pub type Record = Map<String, Value>;

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub rows: Vec<Record>,
    /// Key generated for the first inserted row, on engines that report it
    /// out of band (MySQL). Engines using `RETURNING` leave this empty.
    pub insert_id: Option<i64>,
    pub affected_rows: u64,
}

impl RowSet {
    pub fn rows(rows: Vec<Record>) -> Self {
        let affected_rows = rows.len() as u64;
        Self {
            rows,
            insert_id: None,
            affected_rows,
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        Self {
            rows: Vec::new(),
            insert_id: None,
            affected_rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// No usable connection: acquisition failed or the link broke.
    Connection,
    /// The server rejected the statement.
    Statement,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    /// The connection that produced the error must not be reused.
    pub fatal: bool,
    pub message: String,
}

impl ExecError {
    pub fn connection(message: impl Into<String>, fatal: bool) -> Self {
        Self {
            kind: ExecErrorKind::Connection,
            fatal,
            message: message.into(),
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: ExecErrorKind::Statement,
            fatal: false,
            message: message.into(),
        }
    }
}

/// Runs SQL against a pooled database.
///
/// Each call acquires one connection, runs one statement and releases the
/// connection again, destroying it instead when the failure was fatal.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, ExecError>;

    /// Close every pooled connection. Returns `true` once the pool is closed.
    async fn close(&self) -> bool;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, ExecError> {
        (**self).execute(sql, params).await
    }

    async fn close(&self) -> bool {
        (**self).close().await
    }
}
