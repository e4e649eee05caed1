//! PostgreSQL result decoding and error classification.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Number, Value};
use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

use super::executor::{ExecError, ExecErrorKind, Record};

/// Categorized error types for SQL failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors (e.g., transaction aborted)
    Transaction,
    /// Connection/communication errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

impl ExecError {
    /// Classify a driver error. Connection-class failures are fatal: the
    /// connection that raised them is discarded.
    pub fn from_pg_error(err: &tokio_postgres::Error, sql: &str) -> Self {
        let Some(db_err) = err.as_db_error() else {
            // Non-database error (I/O, protocol, closed socket)
            let fatal = err.is_closed() || err.source().is_some();
            let message = match err.source() {
                Some(source) => format!("{}: {}", err, source),
                None => err.to_string(),
            };
            return Self {
                kind: if fatal {
                    ExecErrorKind::Connection
                } else {
                    ExecErrorKind::Statement
                },
                fatal,
                message,
            };
        };

        let code = db_err.code().code();
        let category = categorize_sqlstate(code);
        let mut lines = vec![format!("{}: {}", category, db_err.message())];

        let position = db_err.position().and_then(|p| match p {
            tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos),
            tokio_postgres::error::ErrorPosition::Internal { .. } => None,
        });
        if let Some(pos) = position {
            let (line, col) = byte_offset_to_line_col(sql, pos as usize);
            lines.push(format!("  at line {}, column {}", line, col));
        }
        lines.push(format!("  SQLSTATE: {}", code));
        if let Some(detail) = db_err.detail() {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            lines.push(format!("  Hint: {}", hint));
        }
        if let Some(constraint) = db_err.constraint() {
            lines.push(format!("  Constraint: {}", constraint));
        }

        let fatal = category == ErrorCategory::Connection || err.is_closed();
        Self {
            kind: if fatal {
                ExecErrorKind::Connection
            } else {
                ExecErrorKind::Statement
            },
            fatal,
            message: lines.join("\n"),
        }
    }
}

/// Convert a 1-based byte offset in a query string to (line, column) both 1-based.
fn byte_offset_to_line_col(query: &str, byte_pos: usize) -> (usize, usize) {
    if byte_pos == 0 || query.is_empty() {
        return (1, 1);
    }
    let target = (byte_pos - 1).min(query.len()); // PostgreSQL positions are 1-based
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in query.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    let class = &code[..2];
    match class {
        // Class 42: Syntax Error or Access Rule Violation
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                // 42P01 = undefined_table, 42703 = undefined_column, etc.
                ErrorCategory::Semantic
            }
        }
        // Class 22: Data Exception, Class 23: Integrity Constraint Violation
        "22" | "23" => ErrorCategory::Execution,
        // Class 25: Invalid Transaction State, Class 40: Transaction Rollback
        "25" | "40" => ErrorCategory::Transaction,
        // Class 08: Connection Exception
        "08" => ErrorCategory::Connection,
        // 57P01 admin_shutdown, 57P02 crash_shutdown, 57P03 cannot_connect_now
        "57" if code.starts_with("57P") => ErrorCategory::Connection,
        "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        _ => ErrorCategory::Unknown,
    }
}

/// A decoded PostgreSQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(Value),
}

impl CellValue {
    pub fn into_json(self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Int16(i) => Value::from(i),
            CellValue::Int32(i) => Value::from(i),
            CellValue::Int64(i) => Value::from(i),
            CellValue::Float32(f) => float_json(f as f64),
            CellValue::Float64(f) => float_json(f),
            CellValue::Text(s) => Value::String(s),
            // Blob columns hold serialized JSON text.
            CellValue::Bytes(b) => match String::from_utf8(b) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
            },
            CellValue::Date(d) => Value::String(d.to_string()),
            CellValue::Time(t) => Value::String(t.to_string()),
            CellValue::DateTime(dt) => Value::String(dt.to_string()),
            CellValue::TimestampTz(dt) => Value::String(dt.to_rfc3339()),
            CellValue::Json(j) => j,
        }
    }
}

fn float_json(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Binary NUMERIC decoded to the nearest `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgNumeric(pub f64);

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let word = |i: usize| -> Result<u16, Box<dyn StdError + Sync + Send>> {
            raw.get(i..i + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "truncated numeric value".into())
        };
        let ndigits = word(0)? as usize;
        let weight = word(2)? as i16 as i32;
        let sign = word(4)?;
        if sign == NUMERIC_NAN {
            return Ok(PgNumeric(f64::NAN));
        }
        let mut value = 0f64;
        for i in 0..ndigits {
            let digit = word(8 + i * 2)? as f64;
            value += digit * 10000f64.powi(weight - i as i32);
        }
        if sign == NUMERIC_NEG {
            value = -value;
        }
        Ok(PgNumeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decode every row into a column-name keyed record.
pub fn rows_to_records(rows: &[Row]) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    (
                        col.name().to_string(),
                        extract_value(row, i, col.type_()).into_json(),
                    )
                })
                .collect()
        })
        .collect()
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let value = match *pg_type {
        Type::BOOL => get(row, idx).map(CellValue::Bool),
        Type::INT2 => get(row, idx).map(CellValue::Int16),
        Type::INT4 => get(row, idx).map(CellValue::Int32),
        Type::INT8 => get(row, idx).map(CellValue::Int64),
        Type::FLOAT4 => get(row, idx).map(CellValue::Float32),
        Type::FLOAT8 => get(row, idx).map(CellValue::Float64),
        Type::NUMERIC => get::<PgNumeric>(row, idx).map(|n| CellValue::Float64(n.0)),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::CHAR | Type::BPCHAR => {
            get(row, idx).map(CellValue::Text)
        }
        Type::BYTEA => get(row, idx).map(CellValue::Bytes),
        Type::DATE => get(row, idx).map(CellValue::Date),
        Type::TIME => get(row, idx).map(CellValue::Time),
        Type::TIMESTAMP => get(row, idx).map(CellValue::DateTime),
        Type::TIMESTAMPTZ => get(row, idx).map(CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx).map(CellValue::Json),
        // Fallback: try to get as string
        _ => get(row, idx).map(CellValue::Text),
    };
    value.unwrap_or(CellValue::Null)
}
