//! In-memory SQLite executor and shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use relsql::ast::{Dialect, SqlParam};
use relsql::db::{Database, ExecError, Executor, Record, RowSet, SyncOptions};
use relsql::model::{Field, FieldType, ModelRegistry, RelationKind, Schema};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    pub fn in_memory() -> Self {
        Self {
            conn: Mutex::new(Connection::open_in_memory().expect("open in-memory sqlite")),
        }
    }
}

fn to_sqlite(param: &SqlParam) -> SqliteValue {
    match param {
        SqlParam::Null => SqliteValue::Null,
        SqlParam::Bool(v) => SqliteValue::Integer(i64::from(*v)),
        SqlParam::Int(v) => SqliteValue::Integer(*v),
        SqlParam::Float(v) => SqliteValue::Real(*v),
        SqlParam::Text(v) => SqliteValue::Text(v.clone()),
        SqlParam::Bytes(v) => SqliteValue::Blob(v.clone()),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn statement_error(err: rusqlite::Error) -> ExecError {
    ExecError::statement(err.to_string())
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, ExecError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ExecError::connection("sqlite connection poisoned", true))?;
        let mut statement = conn.prepare(sql).map_err(statement_error)?;
        let values: Vec<SqliteValue> = params.iter().map(to_sqlite).collect();

        if statement.column_count() == 0 {
            let affected = statement
                .execute(params_from_iter(values.iter()))
                .map_err(statement_error)?;
            return Ok(RowSet::affected(affected as u64));
        }

        let names: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = statement
            .query(params_from_iter(values.iter()))
            .map_err(statement_error)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(statement_error)? {
            let mut record = Record::new();
            for (i, name) in names.iter().enumerate() {
                let value = row.get_ref(i).map_err(statement_error)?;
                record.insert(name.clone(), to_json(value));
            }
            records.push(record);
        }
        Ok(RowSet::rows(records))
    }

    async fn close(&self) -> bool {
        true
    }
}

/// Models exercising every storage kind.
pub fn registry() -> ModelRegistry {
    ModelRegistry::new(vec![
        Schema::new("Permission")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("resource", FieldType::String).required())
            .field(Field::new("action", FieldType::String).required()),
        Schema::new("Profile")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("bio", FieldType::Text)),
        Schema::new("User")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("name", FieldType::String).required())
            .field(Field::new("age", FieldType::Integer))
            .field(Field::new("active", FieldType::Boolean).default_value(true))
            .field(Field::relation("profile", "Profile", RelationKind::OneToMany).weak()),
        Schema::new("Role")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("name", FieldType::String).required().unique())
            .field(Field::new("desc", FieldType::Text).multilingual())
            .field(Field::relation("permissions", "Permission", RelationKind::ManyToMany))
            .field(Field::list("scores", FieldType::Integer))
            .field(Field::list("labels", FieldType::String))
            .field(Field::new("meta", FieldType::Object))
            .field(Field::new("status", FieldType::Boolean).default_value(true)),
        Schema::new("Tag")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("name", FieldType::String)),
        Schema::new("Post")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("title", FieldType::String))
            .field(Field::relation("author", "User", RelationKind::OneToMany))
            .field(Field::relation("tags", "Tag", RelationKind::ManyToMany).weak()),
        Schema::new("Person")
            .field(Field::new("id", FieldType::Integer).primary())
            .field(Field::new("name", FieldType::String))
            .field(Field::relation("friends", "Person", RelationKind::ManyToMany)),
    ])
    .expect("fixture models are valid")
}

/// Fresh database with every table created.
pub async fn database() -> Database<SqliteExecutor> {
    let db = Database::new(SqliteExecutor::in_memory(), registry(), Dialect::Sqlite);
    db.init(&SyncOptions::default()).await.expect("sync schema");
    db
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Number of rows in `table`.
pub async fn row_count(db: &Database<SqliteExecutor>, table: &str) -> i64 {
    let result = db
        .query(&format!("SELECT COUNT(*) AS n FROM \"{}\"", table), &[])
        .await
        .expect("count rows");
    result.rows[0]["n"].as_i64().expect("integer count")
}

/// Primary key of the first returned item.
pub fn first_id(items: &[Record]) -> Value {
    items.first().expect("at least one item")["id"].clone()
}
