//! SQL dialect differences and parameter binding.
//!
//! The compilers never inline values: every value goes through [`Bindings`],
//! which hands back the placeholder text for the current dialect and keeps
//! the parameters in statement order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}

impl Dialect {
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// `alias.column`, both quoted.
    pub fn qualified(self, alias: &str, column: &str) -> String {
        format!("{}.{}", self.quote(alias), self.quote(column))
    }

    /// Placeholder for the `index`-th (1-based) parameter.
    ///
    /// PostgreSQL placeholders carry a cast so the server infers the same type
    /// the client binds.
    pub fn placeholder(self, index: usize, param: &SqlParam) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => match param.pg_cast() {
                Some(cast) => format!("${}::{}", index, cast),
                None => format!("${}", index),
            },
        }
    }

    pub fn limit(self, offset: u64, limit: u64) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => format!("LIMIT {}, {}", offset, limit),
            Dialect::Postgres => format!("LIMIT {} OFFSET {}", limit, offset),
        }
    }

    /// JSON object text built by the engine from `(key, expression)` pairs.
    /// Values are cast to text; NULL stays a JSON null.
    pub fn json_object(self, pairs: &[(&str, String)]) -> String {
        let cast = match self {
            Dialect::MySql => "CHAR",
            Dialect::Postgres | Dialect::Sqlite => "TEXT",
        };
        let args: Vec<String> = pairs
            .iter()
            .map(|(key, expr)| {
                format!("'{}', CAST({} AS {})", key.replace('\'', "''"), expr, cast)
            })
            .collect();
        match self {
            Dialect::MySql => format!("JSON_OBJECT({})", args.join(", ")),
            Dialect::Postgres => format!("CAST(json_build_object({}) AS TEXT)", args.join(", ")),
            Dialect::Sqlite => format!("json_object({})", args.join(", ")),
        }
    }

    /// Trailing clause that makes an INSERT return the generated key.
    pub fn returning(self, column: &str) -> Option<String> {
        match self {
            Dialect::MySql => None,
            Dialect::Postgres | Dialect::Sqlite => Some(format!("RETURNING {}", self.quote(column))),
        }
    }

    /// INSERT for a row where every column takes its default.
    pub fn insert_defaults(self, table: &str) -> String {
        match self {
            Dialect::MySql => format!("INSERT INTO {} () VALUES ()", self.quote(table)),
            Dialect::Postgres | Dialect::Sqlite => {
                format!("INSERT INTO {} DEFAULT VALUES", self.quote(table))
            }
        }
    }

    pub fn table_options(self) -> &'static str {
        match self {
            Dialect::MySql => " ENGINE=InnoDB",
            Dialect::Postgres | Dialect::Sqlite => "",
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlParam {
    fn pg_cast(&self) -> Option<&'static str> {
        match self {
            SqlParam::Null => None,
            SqlParam::Bool(_) => Some("BOOLEAN"),
            SqlParam::Int(_) => Some("BIGINT"),
            SqlParam::Float(_) => Some("FLOAT8"),
            SqlParam::Text(_) => Some("TEXT"),
            SqlParam::Bytes(_) => Some("BYTEA"),
        }
    }

    /// Bind a JSON value. Arrays and objects are stored as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlParam::Text(value.to_string()),
        }
    }

    /// Bind a value destined for a blob column.
    pub fn object(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            other => SqlParam::Bytes(other.to_string().into_bytes()),
        }
    }

    /// Bind a primary or foreign key. Numeric strings bind as integers.
    pub fn id(value: &Value) -> Self {
        match value {
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => SqlParam::Int(i),
                Err(_) => SqlParam::Text(s.clone()),
            },
            other => SqlParam::from_json(other),
        }
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

/// Parameters collected while rendering one statement.
#[derive(Debug, Clone)]
pub struct Bindings {
    dialect: Dialect,
    params: Vec<SqlParam>,
}

impl Bindings {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Bind a parameter and return its placeholder. `NULL` is rendered
    /// literally and never bound.
    pub fn push(&mut self, param: SqlParam) -> String {
        if param == SqlParam::Null {
            return "NULL".to_string();
        }
        let placeholder = self.dialect.placeholder(self.params.len() + 1, &param);
        self.params.push(param);
        placeholder
    }

    /// Bind each parameter and return the comma-separated placeholders.
    pub fn push_all(&mut self, params: impl IntoIterator<Item = SqlParam>) -> String {
        params
            .into_iter()
            .map(|p| self.push(p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

/// SQL text with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, bindings: Bindings) -> Self {
        Self {
            sql: sql.into(),
            params: bindings.into_params(),
        }
    }

    /// Statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}
