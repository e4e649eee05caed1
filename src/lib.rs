//! Relational storage adapter: declarative model schemas persisted in
//! MySQL, PostgreSQL or SQLite tables, with relations, list fields and
//! multilingual fields mapped onto auxiliary tables.
pub mod ast;
pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use ast::{Condition, Dialect, Query};
pub use db::{Database, DeleteResult, Executor, QueryOptions, QueryResult, Record};
pub use error::{AdapterError, Result};
pub use model::{Field, FieldType, ModelRegistry, RelationKind, Schema};
